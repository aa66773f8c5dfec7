//! Merchant/admin/clerk directory entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use myduka_auth::Role;
use myduka_core::{Record, RecordId, StoreId};
use myduka_events::EventKind;

use crate::collection::{Placement, ReconciledCollection};
use crate::domain::Domain;
use crate::filter::Filterable;

/// Store a user is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRef {
    pub id: StoreId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub stores: Vec<StoreRef>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields this client does not model; kept so merges never drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_status() -> String {
    "ACTIVE".to_string()
}

impl Record for UserRecord {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Filterable for UserRecord {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }

    fn search_text(&self) -> Vec<&str> {
        let mut text = vec![self.name.as_str(), self.email.as_str()];
        text.extend(self.stores.iter().map(|s| s.name.as_str()));
        text
    }
}

/// User directory as seen by a merchant (admins) or an admin (clerks).
pub struct Users;

impl Domain for Users {
    type Record = UserRecord;

    const NAME: &'static str = "users";
    const RESOURCE: &'static str = "users";
    const PLURAL_KEY: &'static str = "users";
    const SINGULAR_KEY: &'static str = "user";
    const PLACEMENT: Placement = Placement::Append;

    fn events() -> &'static [(&'static str, EventKind)] {
        &[
            ("user_created", EventKind::Created),
            ("user_updated", EventKind::Updated),
            ("user_deleted", EventKind::Deleted),
            ("user_status_changed", EventKind::StatusChanged),
        ]
    }
}

impl Users {
    /// Role whose accounts the viewer manages, if any.
    pub fn managed_role(viewer: Role) -> Option<Role> {
        match viewer {
            Role::Merchant => Some(Role::Admin),
            Role::Admin => Some(Role::Clerk),
            Role::Clerk => None,
        }
    }

    pub fn online_count(collection: &ReconciledCollection<UserRecord>) -> usize {
        collection.count_where(|u| u.is_online)
    }
}
