//! The one place where free-text comparison rules live.
//!
//! Department checks, keyword matching in the resolver and the admin
//! search filters all go through these helpers: surrounding whitespace
//! is ignored and comparison is case-insensitive.

/// Canonical form of a free-text value: trimmed and upper-cased.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// True when both values are equal after normalization.
pub fn same(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Substring match after normalization. An empty needle matches everything.
pub fn contains(haystack: &str, needle: &str) -> bool {
    normalize(haystack).contains(&normalize(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_ignores_case() {
        assert_eq!(normalize("  Engineering \t"), "ENGINEERING");
        assert!(same(" it", "IT "));
        assert!(!same("IT", "I T"));
    }

    #[test]
    fn substring_search_is_case_insensitive() {
        assert!(contains("Maria Santos", "santos"));
        assert!(contains("REF-0042", " ref-00"));
        assert!(contains("anything", ""));
        assert!(!contains("Maria", "john"));
    }
}
