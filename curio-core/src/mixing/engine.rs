//! Outlier selection
//!
//! `k = round(N * pct / 100)` candidates (half rounds up, clamped to `[0, N]`)
//! are labeled outlier: those farthest from the anchor under the configured
//! [`DiversityStrategy`], ties going to the less relevant candidate and then
//! to the smaller `object_id`. The anchor itself is taken last. Labeling is
//! pure: the same candidates and percentage always give the same labels.

use super::diversity::{CategorySignature, DiversityStrategy};
use super::{Label, MixingConfig};
use crate::provider::Candidate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Candidate annotated with its serve-time label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCandidate {
    pub label: Label,
    #[serde(flatten)]
    pub candidate: Candidate,
}

/// Number of outliers for `n` candidates at `percent`
pub fn outlier_count(n: usize, percent: u8) -> usize {
    let k = (n * percent as usize + 50) / 100;
    k.min(n)
}

#[derive(Debug, Clone)]
pub struct MixingEngine {
    strategy: Arc<dyn DiversityStrategy>,
}

impl Default for MixingEngine {
    fn default() -> Self {
        Self::new(Arc::new(CategorySignature))
    }
}

impl MixingEngine {
    pub fn new(strategy: Arc<dyn DiversityStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Label `candidates`, returned in relevance order
    pub fn mix(&self, candidates: Vec<Candidate>, config: &MixingConfig) -> Vec<LabeledCandidate> {
        let mut ranked = candidates;
        // Stable: equal ranks keep provider order
        ranked.sort_by_key(|c| c.relevance_rank);

        let n = ranked.len();
        let k = outlier_count(n, config.discovery.as_percent());

        let mut labels = vec![Label::Personalized; n];
        if k > 0 {
            for index in self.select_outliers(&ranked, k) {
                labels[index] = Label::Outlier;
            }
        }

        debug!(
            candidates = n,
            outliers = k,
            percent = config.discovery.as_percent(),
            strategy = self.strategy.name(),
            "Mixed search results"
        );

        ranked
            .into_iter()
            .zip(labels)
            .map(|(candidate, label)| LabeledCandidate { label, candidate })
            .collect()
    }

    /// Indices into `ranked` (relevance order) of the `k` outliers
    fn select_outliers(&self, ranked: &[Candidate], k: usize) -> Vec<usize> {
        let Some(anchor) = ranked.first() else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f32)> = ranked
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, candidate)| {
                let distance = self.strategy.distance(anchor, candidate);
                (index, if distance.is_finite() { distance } else { 0.0 })
            })
            .collect();

        scored.sort_by(|(a_idx, a_dist), (b_idx, b_dist)| {
            compare_for_selection((&ranked[*a_idx], *a_dist), (&ranked[*b_idx], *b_dist))
                .then_with(|| b_idx.cmp(a_idx))
        });

        let mut selected: Vec<usize> = scored.into_iter().map(|(index, _)| index).take(k).collect();
        if selected.len() < k {
            selected.push(0);
        }
        selected
    }
}

/// Farther first, then less relevant, then smaller `object_id`
fn compare_for_selection(a: (&Candidate, f32), b: (&Candidate, f32)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.0.relevance_rank.cmp(&a.0.relevance_rank))
        .then_with(|| a.0.object_id.cmp(&b.0.object_id))
}
