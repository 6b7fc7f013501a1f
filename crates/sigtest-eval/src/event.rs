//! Log records and dot-notation field access.
//!
//! A [`Record`] is a JSON object. Field lookups check for a flat key first
//! and fall back to dot-separated traversal (`userIdentity.type`), so that
//! criteria can address nested log structures without flattening them.

use serde_json::{Map, Value};

/// A structured log record: a mapping from field name to JSON value.
pub type Record = Map<String, Value>;

/// A read-only view of a record used during evaluation.
///
/// Flat keys are checked first: `"actor.id"` as a single key takes precedence
/// over `{"actor": {"id": ...}}` nested traversal.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    inner: &'a Record,
}

impl<'a> Event<'a> {
    /// Wrap a record as an event.
    pub fn new(record: &'a Record) -> Self {
        Event { inner: record }
    }

    /// Get a field value by name, supporting dot-notation for nested access.
    ///
    /// When a path segment yields an array, each element is tried and the
    /// first match is returned.
    pub fn get_field(&self, path: &str) -> Option<&'a Value> {
        if let Some(v) = self.inner.get(path) {
            return Some(v);
        }

        if path.contains('.') {
            let parts: Vec<&str> = path.split('.').collect();
            let head = self.inner.get(parts[0])?;
            return traverse(head, &parts[1..]);
        }

        None
    }

    /// Whether the field resolves to any value (including `null`).
    pub fn has_field(&self, path: &str) -> bool {
        self.get_field(path).is_some()
    }
}

/// Mutable counterpart of [`Event::get_field`], resolving the same slot.
pub fn field_mut<'a>(record: &'a mut Record, path: &str) -> Option<&'a mut Value> {
    if record.contains_key(path) {
        return record.get_mut(path);
    }

    if path.contains('.') {
        let parts: Vec<&str> = path.split('.').collect();
        let head = record.get_mut(parts[0])?;
        return traverse_mut(head, &parts[1..]);
    }

    None
}

/// Recursively traverse a JSON value following dot-notation path segments.
fn traverse<'a>(current: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    if parts.is_empty() {
        return Some(current);
    }

    match current {
        Value::Object(map) => traverse(map.get(parts[0])?, &parts[1..]),
        Value::Array(arr) => arr.iter().find_map(|item| traverse(item, parts)),
        _ => None,
    }
}

fn traverse_mut<'a>(current: &'a mut Value, parts: &[&str]) -> Option<&'a mut Value> {
    if parts.is_empty() {
        return Some(current);
    }

    match current {
        Value::Object(map) => traverse_mut(map.get_mut(parts[0])?, &parts[1..]),
        Value::Array(arr) => {
            let idx = arr.iter().position(|item| traverse(item, parts).is_some())?;
            traverse_mut(&mut arr[idx], parts)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_flat_field() {
        let r = record(json!({"eventName": "CreateTrail", "awsRegion": "us-east-1"}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("eventName"), Some(&json!("CreateTrail")));
    }

    #[test]
    fn test_nested_field() {
        let r = record(json!({"userIdentity": {"type": "IAMUser", "principalId": "EXAMPLE"}}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("userIdentity.type"), Some(&json!("IAMUser")));
    }

    #[test]
    fn test_flat_key_precedence() {
        let r = record(json!({"actor.id": "flat_value", "actor": {"id": "nested_value"}}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("actor.id"), Some(&json!("flat_value")));
    }

    #[test]
    fn test_missing_field() {
        let r = record(json!({"foo": "bar"}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("missing"), None);
        assert!(!event.has_field("foo.bar"));
    }

    #[test]
    fn test_null_counts_as_present() {
        let r = record(json!({"errorCode": null}));
        assert!(Event::new(&r).has_field("errorCode"));
    }

    #[test]
    fn test_array_traversal() {
        let r = record(json!({"resources": [{"type": "AWS::S3"}, {"type": "AWS::IAM"}]}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("resources.type"), Some(&json!("AWS::S3")));
    }

    #[test]
    fn test_array_traversal_skips_non_matching_elements() {
        let r = record(json!({"a": [{"x": 1}, {"c": "found"}]}));
        assert_eq!(Event::new(&r).get_field("a.c"), Some(&json!("found")));
    }

    #[test]
    fn test_field_mut_flat_and_nested() {
        let mut r = record(json!({"a": "x", "b": {"c": "y"}}));
        *field_mut(&mut r, "a").unwrap() = json!("changed");
        *field_mut(&mut r, "b.c").unwrap() = json!("nested");
        assert_eq!(r["a"], json!("changed"));
        assert_eq!(r["b"]["c"], json!("nested"));
    }

    #[test]
    fn test_field_mut_resolves_same_slot_as_get_field() {
        let mut r = record(json!({"a": [{"x": 1}, {"c": "one"}, {"c": "two"}]}));
        *field_mut(&mut r, "a.c").unwrap() = json!("patched");
        assert_eq!(Event::new(&r).get_field("a.c"), Some(&json!("patched")));
        assert_eq!(r["a"][2]["c"], json!("two"));
    }

    #[test]
    fn test_field_mut_missing() {
        let mut r = record(json!({"a": "scalar"}));
        assert!(field_mut(&mut r, "a.b").is_none());
        assert!(field_mut(&mut r, "nope").is_none());
    }
}
