//! Synthesized partition names.

/// Prefix of every synthesized partition name.
pub const SUB_COLLECTION_PREFIX: &str = "sub_collection_";

/// Source of synthesized partition names: `sub_collection_1`,
/// `sub_collection_2`, ...
///
/// One sequence is owned by a run and shared by lookup loading and every
/// planning pass, so a name is never handed out twice within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSequence {
    next: u64,
}

impl Default for NameSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Draw the next name.
    pub fn next_name(&mut self) -> String {
        let name = format!("{SUB_COLLECTION_PREFIX}{}", self.next);
        self.next += 1;
        name
    }

    /// Number of names drawn so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

/// Whether `name` can be used as a partition name.
///
/// Names become file stems in the output directory, so they must be
/// non-empty and may not contain path separators or `..`.
pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_one() {
        let mut names = NameSequence::new();
        assert_eq!(names.next_name(), "sub_collection_1");
        assert_eq!(names.next_name(), "sub_collection_2");
        assert_eq!(names.issued(), 2);
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("special"));
        assert!(is_valid_name("sub_collection_7"));
        assert!(is_valid_name("run.167607"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name("../escaped"));
        assert!(!is_valid_name("nested/name"));
        assert!(!is_valid_name("nested\\name"));
        assert!(!is_valid_name(".."));
    }
}
