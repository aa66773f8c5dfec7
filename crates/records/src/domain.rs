//! Binding of a record shape to its REST resource and live events.

use myduka_core::{Patch, Record};
use myduka_core::record::id_from_value;
use myduka_events::{EventKind, LiveEvent};

use crate::collection::{ReconcileError, Reconciled, ReconciledCollection};
use crate::filter::Filterable;

pub use crate::collection::Placement;

/// One reconciled domain (users, payments, supply requests, notifications).
pub trait Domain: Send + Sync + 'static {
    type Record: Record + Filterable;

    /// Human-readable name used in logs and notices.
    const NAME: &'static str;
    /// REST resource path, relative to the API base (`"users"`).
    const RESOURCE: &'static str;
    /// Key of the record array in list responses (`{ users: [...] }`).
    const PLURAL_KEY: &'static str;
    /// Key wrapping a single record in mutation responses (`{ user: {...} }`).
    const SINGULAR_KEY: &'static str;
    const PLACEMENT: Placement;
    /// Field holding the record's status; status-change payloads carrying a
    /// bare `status` are renamed onto it.
    const STATUS_FIELD: &'static str = "status";
    /// Legacy field names still sent by some endpoints, mapped to canonical ones.
    const FIELD_ALIASES: &'static [(&'static str, &'static str)] = &[];

    /// Live event names this domain reacts to.
    fn events() -> &'static [(&'static str, EventKind)];

    fn kind_of(event: &str) -> Option<EventKind> {
        Self::events()
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, kind)| *kind)
    }

    fn collection() -> ReconciledCollection<Self::Record> {
        ReconciledCollection::new(Self::PLACEMENT)
    }
}

/// Apply a live event to a domain collection.
///
/// Events whose name the domain does not bind are ignored.
pub fn reconcile<D: Domain>(
    collection: &mut ReconciledCollection<D::Record>,
    event: &LiveEvent,
) -> Result<Reconciled, ReconcileError> {
    let Some(kind) = D::kind_of(event.name()) else {
        return Ok(Reconciled::Unchanged);
    };

    let missing_id = || ReconcileError::MissingId {
        event: event.name().to_string(),
    };

    let outcome = match kind {
        EventKind::Created => {
            let patch = canonical_patch::<D>(event).ok_or_else(missing_id)?;
            let record: D::Record =
                serde_json::from_value(serde_json::Value::Object(patch.fields().clone())).map_err(|e| {
                    ReconcileError::Payload {
                        event: event.name().to_string(),
                        reason: e.to_string(),
                    }
                })?;
            collection.apply_create(record)
        }
        EventKind::Updated => {
            let patch = canonical_patch::<D>(event).ok_or_else(missing_id)?;
            collection.apply_update(&patch)?
        }
        EventKind::StatusChanged => {
            let mut patch = canonical_patch::<D>(event).ok_or_else(missing_id)?;
            patch.rename_field("status", D::STATUS_FIELD);
            collection.apply_update(&patch)?
        }
        EventKind::Deleted => {
            let id = event
                .patch()
                .map(|p| p.id())
                .or_else(|| id_from_value(event.payload()))
                .ok_or_else(missing_id)?;
            collection.apply_delete(id)
        }
    };

    tracing::debug!(
        domain = D::NAME,
        event = event.name(),
        changed = outcome.changed(),
        "live event reconciled"
    );
    Ok(outcome)
}

fn canonical_patch<D: Domain>(event: &LiveEvent) -> Option<Patch> {
    let mut patch = event.patch()?;
    for (legacy, canonical) in D::FIELD_ALIASES {
        patch.rename_field(legacy, canonical);
    }
    Some(patch)
}
