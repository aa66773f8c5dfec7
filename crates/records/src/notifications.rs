//! In-app notifications pushed to the signed-in user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use myduka_core::{Patch, Record, RecordId};
use myduka_events::EventKind;

use crate::collection::{Placement, ReconcileError, Reconciled, ReconciledCollection};
use crate::domain::Domain;
use crate::filter::Filterable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RecordId,
    pub message: String,
    /// Server-side category (`supply_request`, `payment`, ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Notification {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Filterable for Notification {
    fn status(&self) -> Option<&str> {
        Some(if self.is_read { "READ" } else { "UNREAD" })
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = vec![self.message.as_str()];
        text.extend(self.kind.as_deref());
        text
    }
}

pub struct Notifications;

impl Domain for Notifications {
    type Record = Notification;

    const NAME: &'static str = "notifications";
    const RESOURCE: &'static str = "notifications";
    const PLURAL_KEY: &'static str = "notifications";
    const SINGULAR_KEY: &'static str = "notification";
    const PLACEMENT: Placement = Placement::Prepend;

    fn events() -> &'static [(&'static str, EventKind)] {
        &[
            ("notification", EventKind::Created),
            ("notification_updated", EventKind::Updated),
            ("notification_deleted", EventKind::Deleted),
        ]
    }
}

impl Notifications {
    pub fn unread_count(collection: &ReconciledCollection<Notification>) -> usize {
        collection.count_where(|n| !n.is_read)
    }

    /// Optimistically mark one notification as read.
    pub fn mark_read(
        collection: &mut ReconciledCollection<Notification>,
        id: RecordId,
    ) -> Result<Reconciled, ReconcileError> {
        let patch = Patch::from_value(json!({"id": id.get(), "is_read": true})).ok_or(ReconcileError::MissingId {
            event: "mark_read".to_string(),
        })?;
        collection.apply_update(&patch)
    }

    /// Mark every loaded notification as read; returns how many changed.
    pub fn mark_all_read(collection: &mut ReconciledCollection<Notification>) -> Result<usize, ReconcileError> {
        let unread: Vec<RecordId> = collection
            .records()
            .iter()
            .filter(|n| !n.is_read)
            .map(|n| n.id)
            .collect();
        let mut changed = 0;
        for id in unread {
            if Self::mark_read(collection, id)?.changed() {
                changed += 1;
            }
        }
        Ok(changed)
    }
}
