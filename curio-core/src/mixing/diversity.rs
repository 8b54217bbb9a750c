//! Diversity strategies
//!
//! A strategy scores how different a candidate is from the anchor (the most
//! relevant candidate). Distances are in `[0, 1]`; larger means more diverse.
//!
//! - [`CategorySignature`]: `0.5 * [category differs] + 0.5 * (1 - jaccard(attributes))`
//! - [`FeatureVector`]: `(1 - cosine) / 2` over feature vectors, falling back to
//!   [`CategorySignature`] when either vector is missing or the lengths differ

use crate::provider::Candidate;
use curio_common::config::StrategyKind;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub trait DiversityStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Distance of `candidate` from `anchor`, in `[0, 1]`
    fn distance(&self, anchor: &Candidate, candidate: &Candidate) -> f32;
}

/// Category mismatch plus attribute-set dissimilarity
#[derive(Debug, Clone, Copy, Default)]
pub struct CategorySignature;

impl DiversityStrategy for CategorySignature {
    fn name(&self) -> &'static str {
        "category"
    }

    fn distance(&self, anchor: &Candidate, candidate: &Candidate) -> f32 {
        let category_term = if anchor.category == candidate.category {
            0.0
        } else {
            1.0
        };
        let attribute_term = 1.0 - jaccard(&anchor.attributes, &candidate.attributes);

        0.5 * category_term + 0.5 * attribute_term
    }
}

/// Cosine distance between feature vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVector {
    fallback: CategorySignature,
}

impl DiversityStrategy for FeatureVector {
    fn name(&self) -> &'static str {
        "feature_vector"
    }

    fn distance(&self, anchor: &Candidate, candidate: &Candidate) -> f32 {
        let similarity = match (&anchor.features, &candidate.features) {
            (Some(lhs), Some(rhs)) => cosine_similarity(lhs, rhs),
            _ => None,
        };

        match similarity {
            Some(cos) => (1.0 - cos) / 2.0,
            None => self.fallback.distance(anchor, candidate),
        }
    }
}

/// Strategy configured under `[mixing] strategy`
pub fn strategy_for(kind: StrategyKind) -> Arc<dyn DiversityStrategy> {
    match kind {
        StrategyKind::Category => Arc::new(CategorySignature),
        StrategyKind::FeatureVector => Arc::new(FeatureVector::default()),
    }
}

/// Jaccard similarity; two empty sets count as identical
pub fn jaccard(lhs: &BTreeSet<String>, rhs: &BTreeSet<String>) -> f32 {
    if lhs.is_empty() && rhs.is_empty() {
        return 1.0;
    }

    let intersection = lhs.intersection(rhs).count();
    let union = lhs.union(rhs).count();

    intersection as f32 / union as f32
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
    if lhs.is_empty() || lhs.len() != rhs.len() {
        return None;
    }

    let mut dot = 0.0_f32;
    let mut lhs_norm = 0.0_f32;
    let mut rhs_norm = 0.0_f32;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        lhs_norm += l * l;
        rhs_norm += r * r;
    }

    if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
        return None;
    }

    let cos = dot / (lhs_norm.sqrt() * rhs_norm.sqrt());
    cos.is_finite().then(|| cos.clamp(-1.0, 1.0))
}
