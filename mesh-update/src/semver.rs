use std::cmp::Ordering;

/// Splits a dotted version string into numeric components, treating any
/// non-numeric segment as `0` rather than rejecting it outright — the
/// runtime's own version string is trusted input, not user-supplied.
fn components(version: &str) -> Vec<u64> {
    version.split('.').map(|part| part.parse::<u64>().unwrap_or(0)).collect()
}

/// Pads the shorter tuple with trailing zeros and lexically compares
/// (spec.md §4.7 "semver-compatible compare: pad tuples, lex-compare").
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = components(a);
    let mut right = components(b);
    let len = left.len().max(right.len());
    left.resize(len, 0);
    right.resize(len, 0);
    left.cmp(&right)
}

pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_versions_compare_equal() {
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn shorter_tuple_is_padded_before_compare() {
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert!(is_newer("1.2.1", "1.2"));
    }

    #[test]
    fn lex_compare_respects_numeric_not_string_order() {
        assert!(is_newer("1.10.0", "1.9.0"));
    }
}
