//! Record contract: server identity + partial-payload merge.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::id::RecordId;

/// A server-identified entity held in a client-side collection.
///
/// `id` is unique within the record's domain and never changes.
pub trait Record: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> RecordId;
}

/// Partial payload of a record as pushed by the server: a JSON object that must
/// carry `id` and may carry any subset of the other fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    id: RecordId,
    fields: Map<String, Value>,
}

impl Patch {
    /// Build a patch from a JSON payload. Returns `None` when the payload is not
    /// an object or its `id` is missing/non-integer.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let id = fields.get("id").and_then(id_from_value)?;
        fields.insert("id".to_string(), Value::from(id.get()));
        Some(Self { id, fields })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Move `from` to `to`. When both are present `to` wins and `from` is dropped.
    pub fn rename_field(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(value) = self.fields.remove(from) {
            self.fields.entry(to.to_string()).or_insert(value);
        }
    }

    /// Shallow-merge this patch onto `existing`.
    ///
    /// Top-level fields present in the patch replace the existing ones; absent
    /// fields are kept. Nested objects/arrays are replaced wholesale.
    pub fn merge_onto<T: Record>(&self, existing: &T) -> Result<T, serde_json::Error> {
        let mut current = match serde_json::to_value(existing)? {
            Value::Object(map) => map,
            other => return serde_json::from_value(other),
        };
        for (key, value) in &self.fields {
            current.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(current))
    }
}

/// Accept both `1` and `"1"` as identifiers; some events stringify ids.
pub fn id_from_value(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64().map(RecordId::new),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: RecordId,
        name: String,
        status: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    }

    impl Record for Item {
        fn id(&self) -> RecordId {
            self.id
        }
    }

    #[test]
    fn patch_requires_object_with_id() {
        assert!(Patch::from_value(json!([1, 2])).is_none());
        assert!(Patch::from_value(json!({"status": "X"})).is_none());
        let stringly = Patch::from_value(json!({"id": "7"})).unwrap();
        assert_eq!(stringly.id(), RecordId::new(7));
        assert_eq!(stringly.fields().get("id"), Some(&json!(7)));
    }

    #[test]
    fn merge_preserves_untouched_fields() {
        let item = Item {
            id: RecordId::new(1),
            name: "A".to_string(),
            status: "ACTIVE".to_string(),
            extra: Map::new(),
        };
        let patch = Patch::from_value(json!({"id": 1, "status": "INACTIVE"})).unwrap();
        let merged = patch.merge_onto(&item).unwrap();
        assert_eq!(merged.name, "A");
        assert_eq!(merged.status, "INACTIVE");
    }

    #[test]
    fn rename_prefers_canonical_field() {
        let mut patch = Patch::from_value(json!({"id": 1, "status": "A"})).unwrap();
        patch.rename_field("status", "state");
        assert_eq!(patch.fields().get("state"), Some(&json!("A")));
        assert!(!patch.contains("status"));

        let mut both = Patch::from_value(json!({"id": 1, "status": "A", "state": "B"})).unwrap();
        both.rename_field("status", "state");
        assert_eq!(both.fields().get("state"), Some(&json!("B")));
        assert!(!both.contains("status"));
    }

    #[test]
    fn merge_keeps_unknown_fields_from_payload() {
        let item = Item {
            id: RecordId::new(1),
            name: "A".to_string(),
            status: "ACTIVE".to_string(),
            extra: Map::new(),
        };
        let patch = Patch::from_value(json!({"id": 1, "branch": "Westlands"})).unwrap();
        let merged = patch.merge_onto(&item).unwrap();
        assert_eq!(merged.extra.get("branch"), Some(&json!("Westlands")));
    }
}
