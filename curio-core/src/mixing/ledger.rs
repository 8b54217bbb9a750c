//! Serve ledger
//!
//! Remembers what was served under which label so interactions reported later
//! are routed by the serve-time label and nothing else. Bounded; the oldest
//! entries are evicted first.

use super::{Label, LabeledCandidate};
use curio_common::{time, Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_LEDGER_CAPACITY: usize = 4096;

/// What the ledger keeps per served candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedCandidate {
    pub query: String,
    pub object_id: String,
    pub label: Label,
    pub features: Value,
}

/// Interaction whose destination table was decided at serve time
///
/// Only [`ServeLedger::route`] constructs one.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedInteraction {
    query: String,
    object_id: String,
    label: Label,
    features: Value,
    timestamp: i64,
}

impl RoutedInteraction {
    fn new(served: ServedCandidate, timestamp: i64) -> Self {
        Self {
            query: served.query,
            object_id: served.object_id,
            label: served.label,
            features: served.features,
            timestamp,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn features(&self) -> &Value {
        &self.features
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Default)]
struct LedgerInner {
    entries: HashMap<Uuid, ServedCandidate>,
    order: VecDeque<Uuid>,
}

#[derive(Debug)]
pub struct ServeLedger {
    capacity: usize,
    inner: Mutex<LedgerInner>,
}

impl Default for ServeLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl ServeLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // Entries are plain data; a panic elsewhere cannot leave them half-written
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a served result set, returning one candidate id per item
    pub fn record(&self, query: &str, served: &[LabeledCandidate]) -> Vec<Uuid> {
        let mut inner = self.lock();
        let mut ids = Vec::with_capacity(served.len());

        for item in served {
            let id = Uuid::new_v4();
            inner.entries.insert(
                id,
                ServedCandidate {
                    query: query.to_string(),
                    object_id: item.candidate.object_id.clone(),
                    label: item.label,
                    features: item.candidate.feature_subset(),
                },
            );
            inner.order.push_back(id);
            ids.push(id);
        }

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }

        ids
    }

    pub fn lookup(&self, candidate_id: &Uuid) -> Option<ServedCandidate> {
        self.lock().entries.get(candidate_id).cloned()
    }

    /// Resolve a reported interaction against its serve-time label
    ///
    /// Unknown (or evicted) ids are `NotFound`; a label that disagrees with
    /// the serve-time label is a `ConstraintViolation`. The entry stays in the
    /// ledger so repeated clicks are each recorded.
    pub fn route(&self, candidate_id: &Uuid, reported: Label) -> Result<RoutedInteraction> {
        let served = self
            .lookup(candidate_id)
            .ok_or_else(|| Error::NotFound(format!("Served candidate {}", candidate_id)))?;

        if served.label != reported {
            warn!(
                %candidate_id,
                served = %served.label,
                reported = %reported,
                "Rejected interaction with mismatched label"
            );
            return Err(Error::ConstraintViolation(format!(
                "Candidate {} was served as {}, not {}",
                candidate_id, served.label, reported
            )));
        }

        debug!(%candidate_id, label = %served.label, "Routing interaction");
        Ok(RoutedInteraction::new(served, time::now_millis()))
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
