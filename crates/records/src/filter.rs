use serde::{Deserialize, Serialize};

/// Fields a record exposes to list filtering.
pub trait Filterable {
    /// Current status value (`"PENDING"`, `"ACTIVE"`, `"PAID"`…), if the record has one.
    fn status(&self) -> Option<&str>;

    /// Text the search box matches against.
    fn search_text(&self) -> Vec<&str>;
}

/// Active list filter: free-text search plus an optional status.
///
/// Matching is case-insensitive. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            status: None,
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            search: None,
            status: Some(status.into()),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search_term().is_none() && self.status_term().is_none()
    }

    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn status_term(&self) -> Option<&str> {
        self.status.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        if let Some(wanted) = self.status_term() {
            match record.status() {
                Some(actual) if actual.eq_ignore_ascii_case(wanted) => {}
                _ => return false,
            }
        }

        match self.search_term() {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                record
                    .search_text()
                    .iter()
                    .any(|hay| hay.to_lowercase().contains(&needle))
            }
        }
    }
}
