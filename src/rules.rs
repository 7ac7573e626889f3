// 🏷️ Keyword Rules - Rules as Data
// Ordered (category value → patterns) tables used to infer taxonomy fields from exercise names

use serde::{Deserialize, Serialize};

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Category value assigned when any pattern matches (e.g. "barbell")
    pub value: String,

    /// Patterns to look for in the name (substring, or wildcard with *)
    pub patterns: Vec<String>,
}

impl KeywordRule {
    pub fn new(value: &str, patterns: &[&str]) -> Self {
        KeywordRule {
            value: value.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// First pattern of this rule found in `text`, if any
    pub fn matching_pattern(&self, text: &str) -> Option<&str> {
        let text_lower = text.to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| pattern_matches(pattern, &text_lower))
            .map(|pattern| pattern.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matching_pattern(text).is_some()
    }
}

/// Match a single pattern against already-lowercased text.
///
/// Plain patterns match anywhere in the text. Patterns containing `*` are
/// anchored: "槓鈴*" must start the text, "*推舉" must end it, and the middle
/// parts must appear in order.
fn pattern_matches(pattern: &str, text_lower: &str) -> bool {
    let pattern_lower = pattern.to_lowercase();
    if pattern_lower.is_empty() {
        return false;
    }

    if !pattern_lower.contains('*') {
        return text_lower.contains(&pattern_lower);
    }

    let parts: Vec<&str> = pattern_lower.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !first.is_empty() && !text_lower.starts_with(first) {
        return false;
    }
    if !last.is_empty() && !text_lower.ends_with(last) {
        return false;
    }

    // Middle parts must appear in order after the prefix
    let mut current_pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text_lower[current_pos..].find(part) {
            Some(pos) => current_pos += pos + part.len(),
            None => return false,
        }
    }

    // Prefix, middle and suffix must not overlap
    parts.len() < 2 || last.is_empty() || current_pos <= text_lower.len() - last.len()
}

// ============================================================================
// KEYWORD TABLE
// ============================================================================

/// Ordered rule list. Declaration order is the priority order: the first rule
/// with a matching pattern wins, so more specific values go first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

/// Which rule matched, and on which pattern
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit<'a> {
    pub value: &'a str,
    pub pattern: &'a str,
}

impl KeywordTable {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        KeywordTable { rules }
    }

    /// Scan rules in declaration order and return the first match
    pub fn first_match(&self, text: &str) -> Option<KeywordHit<'_>> {
        self.rules.iter().find_map(|rule| {
            rule.matching_pattern(text).map(|pattern| KeywordHit {
                value: rule.value.as_str(),
                pattern,
            })
        })
    }

    /// All category values declared in the table, in priority order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.value.as_str())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
