//! Clerk-raised supply requests awaiting an admin decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use myduka_core::{Record, RecordId, StoreId, UserId};
use myduka_events::EventKind;

use crate::collection::{Placement, ReconciledCollection};
use crate::domain::Domain;
use crate::filter::Filterable;

pub const PENDING: &str = "PENDING";
pub const APPROVED: &str = "APPROVED";
pub const DECLINED: &str = "DECLINED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyRequest {
    pub id: RecordId,
    pub product_name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub clerk_id: Option<UserId>,
    #[serde(default)]
    pub store_id: Option<StoreId>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_status() -> String {
    PENDING.to_string()
}

impl SupplyRequest {
    pub fn is_pending(&self) -> bool {
        self.status.eq_ignore_ascii_case(PENDING)
    }
}

impl Record for SupplyRequest {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Filterable for SupplyRequest {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.product_name.as_str()]
    }
}

pub struct SupplyRequests;

impl Domain for SupplyRequests {
    type Record = SupplyRequest;

    const NAME: &'static str = "supply requests";
    const RESOURCE: &'static str = "supply-requests";
    const PLURAL_KEY: &'static str = "supply_requests";
    const SINGULAR_KEY: &'static str = "supply_request";
    const PLACEMENT: Placement = Placement::Prepend;

    fn events() -> &'static [(&'static str, EventKind)] {
        &[
            ("supply_request_created", EventKind::Created),
            ("supply_request_updated", EventKind::Updated),
            ("supply_request_deleted", EventKind::Deleted),
            ("supply_request_status_changed", EventKind::StatusChanged),
        ]
    }
}

impl SupplyRequests {
    pub fn pending_count(collection: &ReconciledCollection<SupplyRequest>) -> usize {
        collection.count_where(SupplyRequest::is_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordFilter;
    use crate::domain::reconcile;
    use myduka_core::PageMeta;
    use myduka_events::LiveEvent;
    use serde_json::json;

    fn request(id: i64) -> SupplyRequest {
        serde_json::from_value(json!({"id": id, "product_name": "Sugar 1kg", "quantity": 12, "status": "PENDING"}))
            .unwrap()
    }

    #[test]
    fn approval_event_moves_request_out_of_pending_view() {
        let mut c = SupplyRequests::collection();
        c.seed(vec![request(1), request(2)], PageMeta::single_page(2));
        c.apply_filter(RecordFilter::status(PENDING));
        assert_eq!(c.visible_count(), 2);

        reconcile::<SupplyRequests>(
            &mut c,
            &LiveEvent::new("supply_request_status_changed", json!({"id": 1, "status": "APPROVED"})),
        )
        .unwrap();

        let statuses: Vec<(i64, &str)> = c.records().iter().map(|r| (r.id.get(), r.status.as_str())).collect();
        assert_eq!(statuses, vec![(1, APPROVED), (2, PENDING)]);
        assert_eq!(c.visible_count(), 1);
        assert_eq!(SupplyRequests::pending_count(&c), 1);
    }

    #[test]
    fn new_requests_show_first_and_duplicates_are_absorbed() {
        let mut c = SupplyRequests::collection();
        c.seed(vec![request(1)], PageMeta::single_page(1));
        let created = LiveEvent::new("supply_request_created", json!({"id": 2, "product_name": "Salt", "quantity": 3}));

        reconcile::<SupplyRequests>(&mut c, &created).unwrap();
        reconcile::<SupplyRequests>(&mut c, &created).unwrap();

        assert_eq!(c.len(), 2);
        assert_eq!(c.records()[0].id, RecordId::new(2));
        assert!(c.records()[0].is_pending());
        assert_eq!(c.meta().total, 2);
    }

    #[test]
    fn unbound_events_are_ignored() {
        let mut c = SupplyRequests::collection();
        c.seed(vec![request(1)], PageMeta::single_page(1));
        let outcome = reconcile::<SupplyRequests>(&mut c, &LiveEvent::new("user_deleted", json!({"id": 1}))).unwrap();
        assert!(!outcome.changed());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn created_event_without_required_fields_is_rejected() {
        let mut c = SupplyRequests::collection();
        let err = reconcile::<SupplyRequests>(&mut c, &LiveEvent::new("supply_request_created", json!({"id": 9})))
            .unwrap_err();
        assert!(matches!(err, crate::ReconcileError::Payload { .. }));
        assert!(c.is_empty());
    }
}
