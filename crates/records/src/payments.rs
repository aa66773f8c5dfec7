//! Supplier payment entries (goods received vs. amount still due).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use myduka_core::{Record, RecordId, StoreId};
use myduka_events::EventKind;

use crate::collection::{Placement, ReconciledCollection};
use crate::domain::Domain;
use crate::filter::Filterable;

pub const PAID: &str = "PAID";
pub const UNPAID: &str = "UNPAID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: RecordId,
    pub supplier_name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub store_id: Option<StoreId>,
    #[serde(default, alias = "quantity")]
    pub quantity_received: i64,
    #[serde(default, alias = "price")]
    pub buying_price: f64,
    #[serde(default)]
    pub amount_due: f64,
    #[serde(default = "default_payment_status")]
    pub payment_status: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_payment_status() -> String {
    UNPAID.to_string()
}

impl PaymentRecord {
    pub fn is_paid(&self) -> bool {
        self.payment_status.eq_ignore_ascii_case(PAID)
    }
}

impl Record for PaymentRecord {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Filterable for PaymentRecord {
    fn status(&self) -> Option<&str> {
        Some(&self.payment_status)
    }

    fn search_text(&self) -> Vec<&str> {
        vec![self.supplier_name.as_str(), self.product_name.as_str()]
    }
}

pub struct Payments;

impl Domain for Payments {
    type Record = PaymentRecord;

    const NAME: &'static str = "payments";
    const RESOURCE: &'static str = "payments";
    const PLURAL_KEY: &'static str = "payments";
    const SINGULAR_KEY: &'static str = "payment";
    const PLACEMENT: Placement = Placement::Append;
    const STATUS_FIELD: &'static str = "payment_status";
    const FIELD_ALIASES: &'static [(&'static str, &'static str)] =
        &[("quantity", "quantity_received"), ("price", "buying_price")];

    fn events() -> &'static [(&'static str, EventKind)] {
        &[
            ("payment_created", EventKind::Created),
            ("payment_updated", EventKind::Updated),
            ("payment_deleted", EventKind::Deleted),
            ("payment_status_updated", EventKind::StatusChanged),
        ]
    }
}

impl Payments {
    pub fn unpaid_count(collection: &ReconciledCollection<PaymentRecord>) -> usize {
        collection.count_where(|p| !p.is_paid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reconcile;
    use myduka_core::PageMeta;
    use myduka_events::LiveEvent;
    use serde_json::json;

    fn entry(id: i64, supplier: &str) -> PaymentRecord {
        serde_json::from_value(json!({
            "id": id,
            "supplier_name": supplier,
            "product_name": "Maize flour",
            "quantity": 40,
            "price": 120.0,
            "amount_due": 4800.0,
        }))
        .unwrap()
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let p = entry(1, "Unga Ltd");
        assert_eq!(p.quantity_received, 40);
        assert_eq!(p.buying_price, 120.0);
        assert!(!p.is_paid());
    }

    #[test]
    fn bare_status_payload_lands_on_payment_status() {
        let mut c = Payments::collection();
        c.seed(vec![entry(1, "Unga Ltd"), entry(2, "Bidco")], PageMeta::single_page(2));
        assert_eq!(Payments::unpaid_count(&c), 2);

        reconcile::<Payments>(&mut c, &LiveEvent::new("payment_status_updated", json!({"id": 2, "status": "PAID"})))
            .unwrap();

        assert!(c.get(RecordId::new(2)).unwrap().is_paid());
        assert!(!c.get(RecordId::new(2)).unwrap().extra.contains_key("status"));
        assert_eq!(Payments::unpaid_count(&c), 1);
        assert_eq!(c.status_counts().get(PAID), Some(&1));
    }

    #[test]
    fn legacy_names_in_updates_merge_onto_canonical_fields() {
        let mut c = Payments::collection();
        c.seed(vec![entry(1, "Unga Ltd")], PageMeta::single_page(1));
        reconcile::<Payments>(&mut c, &LiveEvent::new("payment_updated", json!({"id": 1, "quantity": 55})))
            .unwrap();
        assert_eq!(c.get(RecordId::new(1)).unwrap().quantity_received, 55);
    }

    #[test]
    fn delete_accepts_bare_id_payload() {
        let mut c = Payments::collection();
        c.seed(vec![entry(1, "Unga Ltd")], PageMeta::single_page(1));
        reconcile::<Payments>(&mut c, &LiveEvent::new("payment_deleted", json!(1))).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.meta().total, 0);
    }
}
