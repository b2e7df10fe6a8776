//! When to stop asking: guess, keep going, or give up.

use serde::{Deserialize, Serialize};

use crate::model::EntityId;
use crate::scoring::{Scores, best_candidate};

/// Guess thresholds and the hard question cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergencePolicy {
    /// No voluntary guess before this many questions.
    pub min_questions: u32,
    /// Hard cap: at this count a guess (or give-up) is forced.
    pub max_questions: u32,
    /// Lead over the mean of the other candidates required to guess early.
    pub guess_margin: f64,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            min_questions: 5,
            max_questions: 30,
            guess_margin: 8.0,
        }
    }
}

/// Outcome of evaluating a session after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Ask another question.
    Continue,
    /// Commit to a guess. `forced` is set when the question cap was hit.
    Guess { entity: EntityId, forced: bool },
    /// The cap was hit with no candidates left.
    GiveUp,
}

impl ConvergencePolicy {
    /// Decide the next step for a session with `question_count` answers.
    pub fn evaluate(&self, candidates: &[EntityId], scores: &Scores, question_count: u32) -> Verdict {
        if question_count >= self.min_questions {
            if let Some(top) = best_candidate(candidates, scores) {
                if candidates.len() == 1 || self.leads_clearly(top, candidates, scores) {
                    return Verdict::Guess {
                        entity: top,
                        forced: false,
                    };
                }
            }
        }

        if question_count >= self.max_questions {
            return match best_candidate(candidates, scores) {
                Some(entity) => Verdict::Guess {
                    entity,
                    forced: true,
                },
                None => Verdict::GiveUp,
            };
        }

        Verdict::Continue
    }

    fn leads_clearly(&self, top: EntityId, candidates: &[EntityId], scores: &Scores) -> bool {
        let top_score = scores.get(&top).copied().unwrap_or(0) as f64;
        let others: Vec<f64> = candidates
            .iter()
            .filter(|id| **id != top)
            .map(|id| scores.get(id).copied().unwrap_or(0) as f64)
            .collect();
        if others.is_empty() {
            return true;
        }
        let mean = others.iter().sum::<f64>() / others.len() as f64;
        top_score > mean + self.guess_margin
    }

    /// Percent of the question budget used, capped at 100.
    pub fn progress(&self, question_count: u32) -> u8 {
        if self.max_questions == 0 {
            return 100;
        }
        (question_count as u64 * 100 / self.max_questions as u64).min(100) as u8
    }
}
