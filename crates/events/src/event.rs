use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use myduka_core::Patch;

/// What an inbound event does to a reconciled collection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A full record that may be new to the collection.
    Created,
    /// A partial record to merge onto an existing one.
    Updated,
    /// Removal of a record by id.
    Deleted,
    /// A partial record carrying only the status field(s).
    StatusChanged,
}

/// On-the-wire shape of a live event: `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// A named event received over the live connection.
///
/// Notes:
/// - `delivery_id` is assigned locally on receipt; a redelivered server event
///   gets a new one, so consumers dedupe on the record id, not on this field.
/// - `payload` is a (subset of the) REST resource shape for the event's domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    delivery_id: Uuid,
    name: String,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            delivery_id: Uuid::now_v7(),
            name: name.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn delivery_id(&self) -> Uuid {
        self.delivery_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Interpret the payload as a partial record (`{ id, ... }`).
    ///
    /// Some servers wrap the record (`{ "user": {...} }`); a single-key object
    /// whose value is an object with an `id` is unwrapped.
    pub fn patch(&self) -> Option<Patch> {
        if let Some(patch) = Patch::from_value(self.payload.clone()) {
            return Some(patch);
        }
        match &self.payload {
            Value::Object(map) if map.len() == 1 => {
                map.values().next().cloned().and_then(Patch::from_value)
            }
            _ => None,
        }
    }
}

impl From<WireFrame> for LiveEvent {
    fn from(frame: WireFrame) -> Self {
        Self::new(frame.event, frame.data)
    }
}
