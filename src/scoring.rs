//! Candidate scoring and filtering.
//!
//! Each answer moves every candidate's integer score by how far the
//! candidate's stored value is from the answer: `4 - 2 * |v - a|`, so an
//! exact match gains 4 and an opposite value loses 4. Unknown values count
//! as 0. After scoring, candidates trailing the leader by more than the
//! tolerance are dropped, but never below `min(min_keep, |candidates|)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{AttributeValue, EntityId};

/// Accumulated per-candidate scores. Unbounded and may go negative.
pub type Scores = HashMap<EntityId, i64>;

/// Parameters of the post-answer candidate filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Keep candidates scoring at least `max_score - tolerance`.
    pub tolerance: i64,
    /// Floor on the number of candidates kept.
    pub min_keep: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            tolerance: 10,
            min_keep: 5,
        }
    }
}

/// Score change for one candidate: +4 for an exact match down to -4 for the
/// opposite extreme.
pub fn score_delta(entity_value: AttributeValue, answer: AttributeValue) -> i64 {
    let diff = (entity_value.get() as i64 - answer.get() as i64).abs();
    4 - 2 * diff
}

/// Add the answer's score delta to every candidate.
///
/// `values` holds the known attribute values; candidates missing from it are
/// scored as unknown (0).
pub fn apply_answer(
    candidates: &[EntityId],
    scores: &mut Scores,
    values: &HashMap<EntityId, AttributeValue>,
    answer: AttributeValue,
) {
    for id in candidates {
        let value = values.get(id).copied().unwrap_or(AttributeValue::UNKNOWN);
        *scores.entry(*id).or_insert(0) += score_delta(value, answer);
    }
}

fn score_of(scores: &Scores, id: &EntityId) -> i64 {
    scores.get(id).copied().unwrap_or(0)
}

/// Highest-scoring candidate; the first one in candidate order wins ties.
pub fn best_candidate(candidates: &[EntityId], scores: &Scores) -> Option<EntityId> {
    let mut best: Option<(EntityId, i64)> = None;
    for id in candidates {
        let score = score_of(scores, id);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((*id, score));
        }
    }
    best.map(|(id, _)| id)
}

/// Drop candidates that trail the leader by more than `policy.tolerance`.
///
/// Order of surviving candidates is preserved. When too few survive, the top
/// `min(min_keep, |candidates|)` by score are kept instead (stable on ties).
pub fn filter_candidates(
    candidates: &[EntityId],
    scores: &Scores,
    policy: &FilterPolicy,
) -> Vec<EntityId> {
    let Some(max_score) = candidates.iter().map(|id| score_of(scores, id)).max() else {
        return Vec::new();
    };
    let threshold = max_score - policy.tolerance;

    let filtered: Vec<EntityId> = candidates
        .iter()
        .copied()
        .filter(|id| score_of(scores, id) >= threshold)
        .collect();

    let floor = policy.min_keep.min(candidates.len());
    if filtered.len() < floor {
        let mut ranked = candidates.to_vec();
        ranked.sort_by_key(|id| std::cmp::Reverse(score_of(scores, id)));
        ranked.truncate(floor);
        return ranked;
    }

    if filtered.is_empty() {
        return candidates.to_vec();
    }
    filtered
}
