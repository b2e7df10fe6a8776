//! Post-game reinforcement.
//!
//! Two update paths, deliberately kept separate:
//!
//! - **Effectiveness**: every question asked in a confirmed game moves its
//!   score by an exponential moving average toward a boost. Success yields
//!   `1 + 1/question_count` (short games reward their questions more);
//!   failure yields `failure_boost`. Runs for failures too unless
//!   `learn_from_failures` is off.
//! - **Attribute reinforcement**: only after a correct guess, the guessed
//!   entity's attributes drift toward the answers the player gave.
//!
//! Store failures here are logged and counted, never propagated: the
//! confirmation they follow has already been reported.

use serde::{Deserialize, Serialize};

use crate::model::{Attribute, AttributeValue, CompletedSession, EntityId};
use crate::store::{Catalogue, StoreResult};

/// Reinforcement constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Weight kept from the old effectiveness in the moving average.
    pub ema_decay: f64,
    /// Boost applied to questions of a failed game.
    pub failure_boost: f64,
    /// Weight of the player's answer when reinforcing a stored value.
    pub reinforce_weight: f64,
    /// Confidence gained by a reinforced attribute.
    pub confidence_step: f64,
    /// Confidence of an attribute learned from an answer.
    pub new_confidence: f64,
    /// Update effectiveness after failed games as well.
    pub learn_from_failures: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            ema_decay: 0.9,
            failure_boost: 0.95,
            reinforce_weight: 0.2,
            confidence_step: 0.05,
            new_confidence: 0.7,
            learn_from_failures: true,
        }
    }
}

impl LearningConfig {
    /// Target the moving average is pulled toward for this game.
    pub fn boost(&self, record: &CompletedSession) -> f64 {
        if record.success {
            1.0 + 1.0 / record.question_count.max(1) as f64
        } else {
            self.failure_boost
        }
    }

    pub fn next_effectiveness(&self, current: f64, boost: f64) -> f64 {
        current * self.ema_decay + boost * (1.0 - self.ema_decay)
    }

    /// Move a stored value toward the answer and round to the nearest step.
    pub fn reinforce(&self, current: Attribute, answer: AttributeValue) -> Attribute {
        let blended = current.value.get() as f64 * (1.0 - self.reinforce_weight)
            + answer.get() as f64 * self.reinforce_weight;
        Attribute::new(
            AttributeValue::clamped(blended.round() as i64),
            (current.confidence + self.confidence_step).min(1.0),
        )
    }
}

/// What one learning pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearningReport {
    pub questions_updated: usize,
    pub attributes_reinforced: usize,
    pub attributes_created: usize,
    /// Store operations that failed and were skipped.
    pub failures: usize,
}

/// Applies a completed game's outcome to the catalogue.
pub struct LearningFeedback<'a> {
    store: &'a dyn Catalogue,
    config: &'a LearningConfig,
}

impl<'a> LearningFeedback<'a> {
    pub fn new(store: &'a dyn Catalogue, config: &'a LearningConfig) -> Self {
        Self { store, config }
    }

    /// Run every applicable update path for `record`.
    pub fn apply(&self, record: &CompletedSession) -> LearningReport {
        let mut report = LearningReport::default();
        if record.success || self.config.learn_from_failures {
            self.update_question_effectiveness(record, &mut report);
        }
        if record.success {
            self.reinforce_entity_attributes(record.guessed_entity, record, &mut report);
        }
        tracing::info!(
            session = %record.session_id,
            success = record.success,
            questions = report.questions_updated,
            reinforced = report.attributes_reinforced,
            created = report.attributes_created,
            failures = report.failures,
            "applied learning feedback"
        );
        report
    }

    fn update_question_effectiveness(&self, record: &CompletedSession, report: &mut LearningReport) {
        let boost = self.config.boost(record);
        for qid in &record.questions_asked {
            let question = match self.store.question(*qid) {
                Ok(Some(q)) => q,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(question = %qid, error = %e, "effectiveness read failed");
                    report.failures += 1;
                    continue;
                }
            };
            let next = self
                .config
                .next_effectiveness(question.effectiveness_score, boost);
            match self.store.set_effectiveness(*qid, next) {
                Ok(()) => report.questions_updated += 1,
                Err(e) => {
                    tracing::warn!(question = %qid, error = %e, "effectiveness write failed");
                    report.failures += 1;
                }
            }
        }
    }

    fn reinforce_entity_attributes(
        &self,
        entity: EntityId,
        record: &CompletedSession,
        report: &mut LearningReport,
    ) {
        for (key, answer) in &record.answers {
            let (attribute, created) = match self.store.attribute(entity, key) {
                Ok(Some(current)) => (self.config.reinforce(current, *answer), false),
                Ok(None) => (Attribute::new(*answer, self.config.new_confidence), true),
                Err(e) => {
                    tracing::warn!(%entity, key = %key, error = %e, "attribute read failed");
                    report.failures += 1;
                    continue;
                }
            };
            match self.store.upsert_attribute(entity, key, attribute) {
                Ok(()) if created => report.attributes_created += 1,
                Ok(()) => report.attributes_reinforced += 1,
                Err(e) => {
                    tracing::warn!(%entity, key = %key, error = %e, "attribute write failed");
                    report.failures += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStats {
    pub name: String,
    pub times_played: u64,
    pub times_guessed: u64,
    /// Percent, one decimal.
    pub guess_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionStats {
    pub text: String,
    /// Two decimals.
    pub effectiveness: f64,
    pub times_asked: u64,
}

/// Aggregate view of how well the engine has been doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStats {
    pub total_games: usize,
    pub successful_games: usize,
    /// Percent, two decimals.
    pub success_rate: f64,
    /// One decimal.
    pub avg_questions: f64,
    pub top_entities: Vec<EntityStats>,
    pub top_questions: Vec<QuestionStats>,
    pub total_entities: usize,
    pub total_questions: usize,
}

const TOP_N: usize = 5;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Compute learning statistics from the catalogue.
pub fn stats(store: &dyn Catalogue) -> StoreResult<LearningStats> {
    let sessions = store.completed_sessions()?;
    let total_games = sessions.len();
    let successful_games = sessions.iter().filter(|s| s.success).count();
    let avg_questions = if total_games == 0 {
        0.0
    } else {
        sessions.iter().map(|s| s.question_count as f64).sum::<f64>() / total_games as f64
    };

    let mut entities = store.entities()?;
    let total_entities = entities.len();
    entities.sort_by(|a, b| b.times_played.cmp(&a.times_played));
    let top_entities = entities
        .into_iter()
        .take(TOP_N)
        .map(|e| EntityStats {
            guess_rate: round_to(percent(e.times_guessed, e.times_played), 1),
            name: e.name,
            times_played: e.times_played,
            times_guessed: e.times_guessed,
        })
        .collect();

    let mut questions = store.questions()?;
    let total_questions = questions.len();
    questions.sort_by(|a, b| b.effectiveness_score.total_cmp(&a.effectiveness_score));
    let top_questions = questions
        .into_iter()
        .take(TOP_N)
        .map(|q| QuestionStats {
            text: q.text,
            effectiveness: round_to(q.effectiveness_score, 2),
            times_asked: q.times_asked,
        })
        .collect();

    Ok(LearningStats {
        total_games,
        successful_games,
        success_rate: round_to(percent(successful_games as u64, total_games as u64), 2),
        avg_questions: round_to(avg_questions, 1),
        top_entities,
        top_questions,
        total_entities,
        total_questions,
    })
}
