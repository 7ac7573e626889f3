// 🗂️ Taxonomy Configuration - Keyword tables, defaults and aliases as versioned data
//
// The classifier never owns its tables: everything it knows about body parts,
// equipment, exercise types and joint types arrives through this struct.

use crate::rules::KeywordTable;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

const BUILTIN_TAXONOMY: &str = include_str!("../config/taxonomy.json");

// ============================================================================
// TAXONOMY FIELD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyField {
    BodyPart,
    Equipment,
    ExerciseType,
    JointType,
}

impl TaxonomyField {
    pub const ALL: [TaxonomyField; 4] = [
        TaxonomyField::BodyPart,
        TaxonomyField::Equipment,
        TaxonomyField::ExerciseType,
        TaxonomyField::JointType,
    ];

    /// Order in which missing fields are resolved within one exercise.
    /// Equipment goes first so exercise-type inference can see it, and joint
    /// type goes last because it depends on the exercise type.
    pub const PASS_ORDER: [TaxonomyField; 4] = [
        TaxonomyField::Equipment,
        TaxonomyField::ExerciseType,
        TaxonomyField::BodyPart,
        TaxonomyField::JointType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyField::BodyPart => "body_part",
            TaxonomyField::Equipment => "equipment",
            TaxonomyField::ExerciseType => "exercise_type",
            TaxonomyField::JointType => "joint_type",
        }
    }
}

impl fmt::Display for TaxonomyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefaults {
    pub body_part: String,
    pub exercise_type: String,
    pub equipment: String,
    pub joint_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAliases {
    #[serde(default)]
    pub body_part: HashMap<String, String>,
    #[serde(default)]
    pub equipment: HashMap<String, String>,
    #[serde(default)]
    pub exercise_type: HashMap<String, String>,
    #[serde(default)]
    pub joint_type: HashMap<String, String>,
}

impl FieldAliases {
    fn for_field(&self, field: TaxonomyField) -> &HashMap<String, String> {
        match field {
            TaxonomyField::BodyPart => &self.body_part,
            TaxonomyField::Equipment => &self.equipment,
            TaxonomyField::ExerciseType => &self.exercise_type,
            TaxonomyField::JointType => &self.joint_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Version tag of the table set, echoed in migration reports
    pub version: String,

    pub body_parts: KeywordTable,
    pub equipment: KeywordTable,
    pub exercise_types: KeywordTable,
    pub joint_types: KeywordTable,

    /// Exercise type assigned by equipment-based inference
    pub resistance_type: String,

    /// Equipment values that imply the resistance exercise type
    pub equipment_implies_resistance: Vec<String>,

    /// Exercise types for which joint type is not classified
    pub joint_exempt_types: Vec<String>,

    pub defaults: FieldDefaults,

    /// Source label → canonical value, per field
    #[serde(default)]
    pub aliases: FieldAliases,

    /// Ordered (phrase, translation) pairs used to compose translated names
    #[serde(default)]
    pub translations: Vec<(String, String)>,
}

impl TaxonomyConfig {
    /// Tables shipped with the crate (config/taxonomy.json)
    pub fn builtin() -> Result<Self> {
        serde_json::from_str(BUILTIN_TAXONOMY).context("Failed to parse builtin taxonomy JSON")
    }

    /// Load tables from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read taxonomy file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse taxonomy JSON")
    }

    pub fn keywords(&self, field: TaxonomyField) -> &KeywordTable {
        match field {
            TaxonomyField::BodyPart => &self.body_parts,
            TaxonomyField::Equipment => &self.equipment,
            TaxonomyField::ExerciseType => &self.exercise_types,
            TaxonomyField::JointType => &self.joint_types,
        }
    }

    pub fn default_for(&self, field: TaxonomyField) -> &str {
        match field {
            TaxonomyField::BodyPart => &self.defaults.body_part,
            TaxonomyField::Equipment => &self.defaults.equipment,
            TaxonomyField::ExerciseType => &self.defaults.exercise_type,
            TaxonomyField::JointType => &self.defaults.joint_type,
        }
    }

    pub fn implies_resistance(&self, equipment: &str) -> bool {
        self.equipment_implies_resistance
            .iter()
            .any(|e| e == equipment)
    }

    pub fn is_joint_exempt(&self, exercise_type: &str) -> bool {
        self.joint_exempt_types.iter().any(|t| t == exercise_type)
    }

    /// Map a raw source value onto its canonical form.
    ///
    /// Blank values yield `None`. Unknown values are kept (trimmed) so that
    /// labels outside the tables still survive the migration.
    pub fn canonicalize(&self, field: TaxonomyField, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let aliases = self.aliases.for_field(field);
        if let Some(canonical) = aliases.get(trimmed) {
            return Some(canonical.clone());
        }

        let lower = trimmed.to_lowercase();
        let canonical = aliases
            .iter()
            .find(|(alias, _)| alias.to_lowercase() == lower)
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or_else(|| trimmed.to_string());

        Some(canonical)
    }
}

// ============================================================================
// TESTS
// ============================================================================
