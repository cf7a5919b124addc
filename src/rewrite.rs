//! Rewrites `field == null` / `field != null` into the engine's null predicates.

use regex::Regex;
use std::sync::LazyLock;

static IS_NULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(`[^`]+`|[\w`]+)\s*==\s*null\b").expect("Invalid regex")
});

static NOT_NULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(`[^`]+`|[\w`]+)\s*!=\s*null\b").expect("Invalid regex")
});

/// Replaces every `X == null` with `X.isnull()` and every `X != null` with
/// `X.notnull()`, leaving the rest of the query untouched.
///
/// The result contains no `== null` or `!= null` forms, so applying this twice
/// gives the same string as applying it once.
pub fn rewrite_null_checks(query: &str) -> String {
    let rewritten = IS_NULL.replace_all(query, "${1}.isnull()");
    NOT_NULL.replace_all(&rewritten, "${1}.notnull()").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_both_forms() {
        assert_eq!(
            rewrite_null_checks("(nama_member == null) AND (tanggal_join_member != null)"),
            "(nama_member.isnull()) AND (tanggal_join_member.notnull())"
        );
    }

    #[test]
    fn test_leaves_other_conditions_alone() {
        let query = r#"kota == "Bandung" AND is_null_flag == 1 OR harga_jual >= 5000"#;
        assert_eq!(rewrite_null_checks(query), query);
        assert_eq!(rewrite_null_checks(""), "");
    }

    #[test]
    fn test_preserves_surrounding_text() {
        assert_eq!(
            rewrite_null_checks(r#"kota == "Bandung" AND nama_member == null"#),
            r#"kota == "Bandung" AND nama_member.isnull()"#
        );
    }

    #[test]
    fn test_spacing_and_quoted_identifiers() {
        assert_eq!(rewrite_null_checks("x==null"), "x.isnull()");
        assert_eq!(rewrite_null_checks("x  !=   null"), "x.notnull()");
        assert_eq!(rewrite_null_checks("`Col Name` == null"), "`Col Name`.isnull()");
    }

    #[test]
    fn test_word_boundary_after_null() {
        assert_eq!(rewrite_null_checks("x == nullable"), "x == nullable");
    }

    #[test]
    fn test_idempotent() {
        let queries = [
            "a == null OR NOT (b != null)",
            "`Col Name` != null AND c == 3",
            r#"kota in ["Bandung"]"#,
        ];
        for query in queries {
            let once = rewrite_null_checks(query);
            assert_eq!(rewrite_null_checks(&once), once);
            assert!(!once.contains("== null"));
            assert!(!once.contains("!= null"));
        }
    }
}
