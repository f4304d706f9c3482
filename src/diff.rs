//! Field comparison between the ledger and the manifest.
//!
//! Values are compared after trimming surrounding whitespace. Comparison is
//! case-sensitive.

use metadata_batch_types::{OnChainRecord, TargetRecord};

/// Whether any of name, symbol or uri differs.
pub fn is_different(current: &OnChainRecord, target: &TargetRecord) -> bool {
    !changed_fields(current, target).is_empty()
}

/// Names of the fields that differ, in layout order.
pub fn changed_fields(current: &OnChainRecord, target: &TargetRecord) -> Vec<&'static str> {
    [
        ("name", &current.name, &target.name),
        ("symbol", &current.symbol, &target.symbol),
        ("uri", &current.uri, &target.uri),
    ]
    .into_iter()
    .filter(|(_, a, b)| a.trim() != b.trim())
    .map(|(field, _, _)| field)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata_batch_types::Address;

    fn current(name: &str, symbol: &str, uri: &str) -> OnChainRecord {
        OnChainRecord {
            authority: Address::default(),
            name: name.into(),
            symbol: symbol.into(),
            uri: uri.into(),
        }
    }

    fn target(name: &str, symbol: &str, uri: &str) -> TargetRecord {
        TargetRecord {
            id: Address::default(),
            name: name.into(),
            symbol: symbol.into(),
            uri: uri.into(),
        }
    }

    #[test]
    fn test_identical_after_trim() {
        assert!(!is_different(
            &current("Name ", "SYM", "u"),
            &target("  Name", "SYM", "u\n")
        ));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(is_different(
            &current("name", "SYM", "u"),
            &target("Name", "SYM", "u")
        ));
    }

    #[test]
    fn test_changed_fields_lists_each_difference() {
        assert_eq!(
            changed_fields(&current("a", "S", "u1"), &target("a", "T", "u2")),
            vec!["symbol", "uri"]
        );
    }
}
