// 🌳 Name Decomposer - Hierarchical exercise names → category levels + action name
//
// "推／胸推／地板臥推／槓鈴，推舉" → levels ["推", "胸推", "地板臥推", "", ""], leaf "槓鈴，推舉"

use serde::{Deserialize, Serialize};

/// Maximum number of category levels stored per exercise
pub const MAX_LEVELS: usize = 5;

const PATH_DELIMITER: char = '/';
const FULL_WIDTH_DELIMITER: char = '／';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Category path, left-aligned; unused trailing levels are empty strings
    pub levels: [String; MAX_LEVELS],

    /// Final path segment (the action itself)
    pub leaf: String,

    /// Category segments beyond the fifth level. They are not stored anywhere;
    /// callers should report them because the catalog loses that information.
    pub dropped: Vec<String>,
}

impl Decomposition {
    pub fn is_truncated(&self) -> bool {
        !self.dropped.is_empty()
    }

    /// Number of populated category levels
    pub fn depth(&self) -> usize {
        self.levels.iter().take_while(|level| !level.is_empty()).count()
    }
}

/// Split a hierarchical name into up to five category levels plus a leaf.
pub fn decompose(name: &str) -> Decomposition {
    let normalized: String = name
        .chars()
        .map(|c| if c == FULL_WIDTH_DELIMITER { PATH_DELIMITER } else { c })
        .collect();

    let mut segments: Vec<String> = normalized
        .split(PATH_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    let leaf = match segments.pop() {
        Some(leaf) => leaf,
        None => return Decomposition::default(),
    };

    let mut decomposition = Decomposition {
        leaf,
        ..Decomposition::default()
    };

    let mut category_parts = segments.into_iter();
    for level in decomposition.levels.iter_mut() {
        match category_parts.next() {
            Some(part) => *level = part,
            None => break,
        }
    }
    decomposition.dropped = category_parts.collect();

    decomposition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_width_path() {
        let d = decompose("推／胸推／地板臥推／槓鈴，推舉");

        assert_eq!(d.levels[0], "推");
        assert_eq!(d.levels[1], "胸推");
        assert_eq!(d.levels[2], "地板臥推");
        assert_eq!(d.levels[3], "");
        assert_eq!(d.levels[4], "");
        assert_eq!(d.leaf, "槓鈴，推舉");
        assert_eq!(d.depth(), 3);
        assert!(!d.is_truncated());
    }

    #[test]
    fn test_segment_counts_one_through_six() {
        let all = ["a", "b", "c", "d", "e", "f"];

        for k in 1..=all.len() {
            let name = all[..k].join("/");
            let d = decompose(&name);

            assert_eq!(d.leaf, all[k - 1], "leaf for k={}", k);
            let expected_levels = (k - 1).min(MAX_LEVELS);
            for i in 0..MAX_LEVELS {
                if i < expected_levels {
                    assert_eq!(d.levels[i], all[i], "level {} for k={}", i, k);
                } else {
                    assert_eq!(d.levels[i], "", "level {} for k={}", i, k);
                }
            }
            assert!(d.dropped.is_empty());
        }
    }

    #[test]
    fn test_no_delimiter_gives_leaf_only() {
        let d = decompose("  槓鈴深蹲  ");

        assert!(d.levels.iter().all(|level| level.is_empty()));
        assert_eq!(d.leaf, "槓鈴深蹲");
        assert_eq!(d.depth(), 0);
    }

    #[test]
    fn test_mixed_delimiters_and_empty_segments() {
        let d = decompose(" 拉 / ／背部//  划船 ");

        assert_eq!(d.levels[0], "拉");
        assert_eq!(d.levels[1], "背部");
        assert_eq!(d.levels[2], "");
        assert_eq!(d.leaf, "划船");
    }

    #[test]
    fn test_levels_beyond_five_are_dropped_and_flagged() {
        let d = decompose("1/2/3/4/5/6/7/leaf");

        assert_eq!(d.levels, ["1", "2", "3", "4", "5"].map(String::from));
        assert_eq!(d.leaf, "leaf");
        assert_eq!(d.dropped, vec!["6".to_string(), "7".to_string()]);
        assert!(d.is_truncated());
    }

    #[test]
    fn test_blank_name() {
        let d = decompose(" / ／ ");

        assert_eq!(d, Decomposition::default());
        assert_eq!(decompose(""), Decomposition::default());
    }
}
