// Records - JSON objects keyed by a caller-assigned `id`

use serde_json::{Map, Value};

/// Field that id-keyed operations match on.
pub const ID_FIELD: &str = "id";

/// A single record: a JSON object. Key order is preserved as written.
pub type Record = Map<String, Value>;

/// The record's `id`, if it has one.
pub fn record_id(record: &Record) -> Option<&Value> {
    record.get(ID_FIELD)
}

/// Whether `record` carries an `id` equal to `id` (JSON value equality).
pub fn has_id(record: &Record, id: &Value) -> bool {
    record_id(record) == Some(id)
}

/// Index of the first record whose `id` equals `id`.
///
/// Ids are not required to be unique; the first match is the one every
/// id-keyed operation acts on.
pub fn position_of(records: &[Record], id: &Value) -> Option<usize> {
    records.iter().position(|r| has_id(r, id))
}

/// Shallow merge: every field of `patch` overwrites the same field of
/// `base` (nulls included), fields absent from `patch` are left alone.
pub fn merge(base: &mut Record, patch: Record) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

/// Render an id for error messages: strings bare, everything else as JSON.
pub fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_patch_wins_and_preserves_other_fields() {
        let mut base = rec(json!({ "id": 7, "a": 0, "b": 2 }));
        merge(&mut base, rec(json!({ "a": 1 })));
        assert_eq!(Value::Object(base), json!({ "id": 7, "a": 1, "b": 2 }));
    }

    #[test]
    fn test_merge_keeps_key_order_of_existing_fields() {
        let mut base = rec(json!({ "id": 1, "item": "pen", "qty": 3 }));
        merge(&mut base, rec(json!({ "item": "pencil", "note": "restocked" })));
        let keys: Vec<&str> = base.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "item", "qty", "note"]);
    }

    #[test]
    fn test_merge_null_overwrites() {
        let mut base = rec(json!({ "id": 1, "a": 5 }));
        merge(&mut base, rec(json!({ "a": null })));
        assert_eq!(base["a"], Value::Null);
    }

    #[test]
    fn test_position_of_takes_first_match() {
        let records = vec![
            rec(json!({ "id": "x", "n": 1 })),
            rec(json!({ "id": "y", "n": 2 })),
            rec(json!({ "id": "x", "n": 3 })),
        ];
        assert_eq!(position_of(&records, &json!("x")), Some(0));
        assert_eq!(position_of(&records, &json!("y")), Some(1));
        assert_eq!(position_of(&records, &json!("z")), None);
    }

    #[test]
    fn test_ids_compare_by_json_value() {
        let record = rec(json!({ "id": 1 }));
        assert!(has_id(&record, &json!(1)));
        assert!(!has_id(&record, &json!("1")));
        assert!(!has_id(&rec(json!({ "name": "no id" })), &json!(1)));
    }

    #[test]
    fn test_display_id() {
        assert_eq!(display_id(&json!("abc")), "abc");
        assert_eq!(display_id(&json!(42)), "42");
    }
}
