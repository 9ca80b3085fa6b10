// ddbsync/src/table/render.rs
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use super::Record;

/// Converts an attribute value into plain JSON for display. Binary values are
/// base64 encoded, numbers that JSON cannot hold are kept as strings.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::B(b) => Value::String(STANDARD.encode(b.as_ref())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| number_to_json(n)).collect()),
        AttributeValue::Bs(items) => Value::Array(
            items
                .iter()
                .map(|b| Value::String(STANDARD.encode(b.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn number_to_json(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Number>(raw)
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn record_to_json(record: &Record) -> Value {
    // Sorted keys keep the dry-run listing stable between runs.
    let mut keys: Vec<&String> = record.keys().collect();
    keys.sort();
    let mut object = Map::with_capacity(keys.len());
    for key in keys {
        object.insert(key.clone(), attribute_to_json(&record[key]));
    }
    Value::Object(object)
}

/// Pretty JSON array of the given records.
pub fn render_records(records: &[Record]) -> String {
    let values: Vec<Value> = records.iter().map(record_to_json).collect();
    serde_json::to_string_pretty(&values).unwrap_or_else(|_| format!("{:?}", records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::primitives::Blob;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_record_to_json_covers_value_taxonomy() {
        let record = Record::from([
            ("id".to_string(), AttributeValue::S("A".into())),
            ("count".to_string(), AttributeValue::N("3".into())),
            ("price".to_string(), AttributeValue::N("2.75".into())),
            ("active".to_string(), AttributeValue::Bool(true)),
            ("missing".to_string(), AttributeValue::Null(true)),
            ("raw".to_string(), AttributeValue::B(Blob::new(b"hi".to_vec()))),
            ("tags".to_string(), AttributeValue::Ss(vec!["x".into(), "y".into()])),
            ("sizes".to_string(), AttributeValue::Ns(vec!["1".into(), "2".into()])),
            (
                "nested".to_string(),
                AttributeValue::M(HashMap::from([(
                    "list".to_string(),
                    AttributeValue::L(vec![AttributeValue::S("z".into())]),
                )])),
            ),
        ]);

        assert_eq!(
            record_to_json(&record),
            json!({
                "id": "A",
                "count": 3,
                "price": 2.75,
                "active": true,
                "missing": null,
                "raw": "aGk=",
                "tags": ["x", "y"],
                "sizes": [1, 2],
                "nested": {"list": ["z"]}
            })
        );
    }

    #[test]
    fn test_unrepresentable_number_stays_text() {
        assert_eq!(attribute_to_json(&AttributeValue::N("not-a-number".into())), json!("not-a-number"));
    }

    #[test]
    fn test_render_records_is_a_json_array() {
        let records = vec![Record::from([("id".to_string(), AttributeValue::S("A".into()))])];
        let rendered = render_records(&records);
        let parsed: Value = serde_json::from_str(&rendered).expect("valid json");
        assert_eq!(parsed, json!([{"id": "A"}]));
    }
}
