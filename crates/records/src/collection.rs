//! Generic reconciled collection.
//!
//! A `ReconciledCollection<T>` is the local, disposable copy of one page of a
//! server list plus whatever live events changed since the page was fetched.
//!
//! ## Invariants
//!
//! - no two records share an id (creates are idempotent, seeds are deduplicated)
//! - `seed` overwrites, it never merges
//! - updates for unknown ids are dropped: an update payload may be partial and is
//!   not safe to insert as a new record
//! - `meta.total` changes only when a record was actually inserted or removed and
//!   never goes below zero
//! - filtering and paging are derivations; they never mutate `records`

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use myduka_core::{PageMeta, Patch, Record, RecordId};

use crate::filter::{Filterable, RecordFilter};

/// Where a live-created record goes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Newest first (notifications, supply requests).
    Prepend,
    /// Oldest first (user directories, payment ledgers).
    Append,
}

/// Whether an operation changed the collection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Changed,
    Unchanged,
}

impl Reconciled {
    pub fn changed(self) -> bool {
        self == Reconciled::Changed
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("event `{event}` carries no usable record id")]
    MissingId { event: String },

    #[error("event `{event}` payload does not match the record shape: {reason}")]
    Payload { event: String, reason: String },

    #[error("merging update into record {id} failed: {reason}")]
    Merge { id: RecordId, reason: String },
}

#[derive(Debug, Clone)]
pub struct ReconciledCollection<T: Record> {
    records: Vec<T>,
    meta: PageMeta,
    filter: RecordFilter,
    placement: Placement,
}

impl<T: Record> ReconciledCollection<T> {
    pub fn new(placement: Placement) -> Self {
        Self {
            records: Vec::new(),
            meta: PageMeta::default(),
            filter: RecordFilter::default(),
            placement,
        }
    }

    /// Replace records and pagination metadata with a fresh fetch.
    ///
    /// Duplicate ids within the page keep their first occurrence.
    pub fn seed(&mut self, records: Vec<T>, meta: PageMeta) {
        let mut seen = HashSet::with_capacity(records.len());
        let before = records.len();
        self.records = records.into_iter().filter(|r| seen.insert(r.id())).collect();
        if self.records.len() != before {
            tracing::warn!(
                dropped = before - self.records.len(),
                "seed page contained duplicate ids"
            );
        }
        self.meta = meta;
    }

    /// Insert a record unless one with the same id is already present.
    pub fn apply_create(&mut self, record: T) -> Reconciled {
        if self.contains(record.id()) {
            return Reconciled::Unchanged;
        }
        match self.placement {
            Placement::Prepend => self.records.insert(0, record),
            Placement::Append => self.records.push(record),
        }
        self.meta.increment_total();
        Reconciled::Changed
    }

    /// Shallow-merge `patch` onto the record with the same id, if present.
    pub fn apply_update(&mut self, patch: &Patch) -> Result<Reconciled, ReconcileError> {
        let Some(slot) = self.records.iter_mut().find(|r| r.id() == patch.id()) else {
            tracing::debug!(id = %patch.id(), "update for unknown record dropped");
            return Ok(Reconciled::Unchanged);
        };

        let merged = patch.merge_onto(slot).map_err(|e| ReconcileError::Merge {
            id: patch.id(),
            reason: e.to_string(),
        })?;
        *slot = merged;
        Ok(Reconciled::Changed)
    }

    /// Remove the record with `id`, if present.
    pub fn apply_delete(&mut self, id: RecordId) -> Reconciled {
        let before = self.records.len();
        self.records.retain(|r| r.id() != id);
        if self.records.len() == before {
            return Reconciled::Unchanged;
        }
        self.meta.decrement_total();
        Reconciled::Changed
    }

    pub fn get(&self, id: RecordId) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// All locally held records, unfiltered, in display order.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn meta(&self) -> PageMeta {
        self.meta
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Records matching an arbitrary predicate.
    pub fn visible_where<P>(&self, predicate: P) -> Vec<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).collect()
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&T) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).count()
    }
}

impl<T: Record + Filterable> ReconciledCollection<T> {
    /// Make `filter` the active filter. Records are not touched.
    pub fn apply_filter(&mut self, filter: RecordFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    /// Records matching the active filter.
    pub fn visible(&self) -> Vec<&T> {
        self.visible_where(|r| self.filter.matches(r))
    }

    pub fn visible_count(&self) -> usize {
        self.count_where(|r| self.filter.matches(r))
    }

    /// One client-side page of the visible records (1-based `page`).
    pub fn visible_page(&self, page: u32, per_page: u32) -> Vec<&T> {
        let per_page = per_page.max(1) as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(per_page);
        self.records
            .iter()
            .filter(|r| self.filter.matches(*r))
            .skip(skip)
            .take(per_page)
            .collect()
    }

    /// Count of records per status value (records without a status are skipped).
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for status in self.records.iter().filter_map(|r| r.status()) {
            *counts.entry(status.to_ascii_uppercase()).or_insert(0) += 1;
        }
        counts
    }
}
