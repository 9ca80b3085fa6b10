// ddbsync/src/sync/diff.rs
use std::collections::HashSet;

use crate::table::{IdentityKey, Record};

/// Source records whose identity does not appear in `target`, in source order.
///
/// Records are matched on `identity_attribute` only; other attributes are not
/// compared. A missing identity matches another missing identity, so source
/// records without one are kept only while the target has no such record.
pub fn diff(source: &[Record], target: &[Record], identity_attribute: &str) -> Vec<Record> {
    let present: HashSet<Option<IdentityKey>> = target
        .iter()
        .map(|record| IdentityKey::of(record, identity_attribute))
        .collect();

    source
        .iter()
        .filter(|record| !present.contains(&IdentityKey::of(record, identity_attribute)))
        .cloned()
        .collect()
}

pub fn count_without_identity(records: &[Record], identity_attribute: &str) -> usize {
    records
        .iter()
        .filter(|record| IdentityKey::of(record, identity_attribute).is_none())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{ids, record, records};
    use aws_sdk_dynamodb::types::AttributeValue;

    #[test]
    fn test_diff_keeps_missing_in_source_order() {
        let source = records(&["A", "B", "C"]);
        let target = records(&["B"]);
        assert_eq!(ids(&diff(&source, &target, "id")), vec!["A", "C"]);
    }

    #[test]
    fn test_diff_identities() {
        let s = records(&["A", "B", "C"]);
        assert!(diff(&s, &s, "id").is_empty());
        assert_eq!(ids(&diff(&s, &[], "id")), vec!["A", "B", "C"]);
        assert!(diff(&[], &s, "id").is_empty());
    }

    #[test]
    fn test_diff_ignores_non_identity_attributes() {
        let mut changed = record("A");
        changed.insert("name".to_string(), AttributeValue::S("something else".into()));
        let result = diff(&records(&["A"]), &[changed], "id");
        assert!(result.is_empty());
    }

    #[test]
    fn test_duplicate_target_identities_are_one_match() {
        let target = records(&["B", "B", "B"]);
        assert_eq!(ids(&diff(&records(&["A", "B"]), &target, "id")), vec!["A"]);
    }

    #[test]
    fn test_diff_uses_configured_identity_attribute() {
        let keyed = |sku: &str| Record::from([("sku".to_string(), AttributeValue::S(sku.into()))]);
        let result = diff(&[keyed("x"), keyed("y")], &[keyed("y")], "sku");
        assert_eq!(result, vec![keyed("x")]);
    }

    #[test]
    fn test_records_without_identity() {
        let anonymous = Record::from([("name".to_string(), AttributeValue::S("n/a".into()))]);
        let other = Record::from([("name".to_string(), AttributeValue::S("other".into()))]);
        let source = vec![anonymous.clone(), record("A")];

        assert_eq!(diff(&source, &records(&["A"]), "id"), vec![anonymous.clone()]);
        assert!(diff(&source, &[other, record("A")], "id").is_empty());
        assert_eq!(ids(&diff(&records(&["A"]), &[anonymous], "id")), vec!["A"]);
        assert_eq!(count_without_identity(&source, "id"), 1);
    }
}
