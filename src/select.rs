//! Question selection by effectiveness-weighted information gain.
//!
//! Greedy single-step lookahead: every call recomputes from the current
//! candidate set, with no cached decision tree. Candidates are assumed
//! uniformly likely, so the entropy of a set of `n` is `log2(n)` bits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::model::{AttributeValue, EntityId, Question, QuestionId};
use crate::store::{Catalogue, StoreResult};

/// Entropy in bits of `n` equally likely candidates. `H(0) = H(1) = 0`.
pub fn entropy(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let p = 1.0 / n as f64;
    -(n as f64) * (p * p.log2())
}

/// Bucket candidates by their value for one attribute; unknowns land in 0.
pub fn answer_distribution(
    candidates: &[EntityId],
    values: &HashMap<EntityId, AttributeValue>,
) -> BTreeMap<AttributeValue, usize> {
    let mut distribution = BTreeMap::new();
    for id in candidates {
        let value = values.get(id).copied().unwrap_or(AttributeValue::UNKNOWN);
        *distribution.entry(value).or_insert(0) += 1;
    }
    distribution
}

/// `H(total) - Σ (count/total) · H(count)`. Never negative.
pub fn information_gain(distribution: &BTreeMap<AttributeValue, usize>, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = distribution
        .values()
        .filter(|&&count| count > 0)
        .map(|&count| (count as f64 / total as f64) * entropy(count))
        .sum();
    (entropy(total) - weighted).max(0.0)
}

/// The chosen question with the numbers that won it.
#[derive(Debug, Clone)]
pub struct QuestionChoice {
    pub question: Question,
    pub gain: f64,
    /// `gain × effectiveness_score`.
    pub adjusted_gain: f64,
}

/// Picks the next question for a candidate set.
pub struct QuestionSelector {
    store: Arc<dyn Catalogue>,
}

impl QuestionSelector {
    pub fn new(store: Arc<dyn Catalogue>) -> Self {
        Self { store }
    }

    /// Known values of `key` for the candidates. A failing store read is
    /// logged and treated as "all unknown".
    pub fn attribute_values(
        &self,
        key: &str,
        candidates: &[EntityId],
    ) -> HashMap<EntityId, AttributeValue> {
        match self.store.attribute_values(key, candidates) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(key, error = %e, "attribute lookup failed, treating values as unknown");
                HashMap::new()
            }
        }
    }

    /// Unasked question with the strictly highest adjusted gain; the first in
    /// catalogue order wins ties. `None` when no candidates or no unasked
    /// questions remain.
    pub fn select_best_question(
        &self,
        candidates: &[EntityId],
        asked: &HashSet<QuestionId>,
    ) -> StoreResult<Option<QuestionChoice>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let total = candidates.len();
        // Several questions may probe the same attribute.
        let mut gains: HashMap<String, f64> = HashMap::new();
        let mut best: Option<QuestionChoice> = None;

        for question in self.store.questions()? {
            if asked.contains(&question.id) {
                continue;
            }
            let gain = match gains.get(&question.attribute_key) {
                Some(gain) => *gain,
                None => {
                    let values = self.attribute_values(&question.attribute_key, candidates);
                    let gain = information_gain(&answer_distribution(candidates, &values), total);
                    gains.insert(question.attribute_key.clone(), gain);
                    gain
                }
            };
            let adjusted_gain = gain * question.effectiveness_score;
            if best
                .as_ref()
                .is_none_or(|b| adjusted_gain > b.adjusted_gain)
            {
                best = Some(QuestionChoice {
                    question,
                    gain,
                    adjusted_gain,
                });
            }
        }

        if let Some(choice) = &best {
            tracing::debug!(
                question = %choice.question.id,
                key = %choice.question.attribute_key,
                gain = choice.gain,
                adjusted = choice.adjusted_gain,
                candidates = total,
                "selected question"
            );
        }
        Ok(best)
    }

    /// Last-resort pick: the unasked question with the highest effectiveness.
    pub fn fallback_question(&self, asked: &HashSet<QuestionId>) -> StoreResult<Option<Question>> {
        Ok(fallback_question(self.store.questions()?, asked))
    }
}

/// Highest-effectiveness unasked question, first in catalogue order on ties.
pub fn fallback_question(
    questions: impl IntoIterator<Item = Question>,
    asked: &HashSet<QuestionId>,
) -> Option<Question> {
    let mut best: Option<Question> = None;
    for question in questions {
        if asked.contains(&question.id) {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|b| question.effectiveness_score > b.effectiveness_score)
        {
            best = Some(question);
        }
    }
    best
}

impl std::fmt::Debug for QuestionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionSelector").finish()
    }
}
