//! The twenty-q engine facade.
//!
//! `GameEngine` owns the catalogue handle, the live-session table, and the
//! question selector, and sequences one game from `start` through `answer`
//! to `confirm` (or `abandon`).

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::convergence::Verdict;
use crate::error::{GameError, TqResult};
use crate::learning::{self, LearningFeedback, LearningReport, LearningStats};
use crate::model::{Answer, EntityId, EntityMeta, NewEntity, Question, QuestionId, SessionId};
use crate::scoring;
use crate::select::QuestionSelector;
use crate::session::{GameSession, SessionState, SessionTable};
use crate::store::{self, Catalogue};

const GIVE_UP_MESSAGE: &str = "I give up! I couldn't figure out what you were thinking of.";

/// First question of a new game.
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub session_id: SessionId,
    pub question: Question,
    pub progress: u8,
    pub candidates_remaining: usize,
}

/// What follows an answer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Question {
        session_id: SessionId,
        question: Question,
        progress: u8,
        candidates_remaining: usize,
        question_count: u32,
    },
    Guess {
        session_id: SessionId,
        entity: EntityMeta,
        progress: u8,
        question_count: u32,
    },
    GiveUp {
        session_id: SessionId,
        message: String,
        progress: u8,
    },
}

/// Acknowledgement of a confirmed guess.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub success: bool,
    pub message: String,
    pub questions_used: u32,
    /// What the post-game update changed, failures included.
    pub learning: LearningReport,
}

/// The game engine.
pub struct GameEngine {
    config: EngineConfig,
    store: Arc<dyn Catalogue>,
    sessions: SessionTable,
    selector: QuestionSelector,
}

impl GameEngine {
    /// Create an engine over the store selected by `config.data_dir`.
    pub fn new(config: EngineConfig) -> TqResult<Self> {
        let store = store::open(config.data_dir.as_deref())?;
        Self::with_store(config, store)
    }

    /// Create an engine over an existing catalogue.
    pub fn with_store(config: EngineConfig, store: Arc<dyn Catalogue>) -> TqResult<Self> {
        config.validate()?;
        tracing::info!(
            persistent = config.data_dir.is_some(),
            max_questions = config.policy.max_questions,
            "game engine initialized"
        );
        Ok(Self {
            selector: QuestionSelector::new(Arc::clone(&store)),
            config,
            store,
            sessions: SessionTable::new(),
        })
    }

    /// Start a game with every entity as a candidate.
    pub fn start(&self) -> TqResult<StartOutcome> {
        let mut session = GameSession::new(self.store.entity_ids()?);

        let question = match self
            .selector
            .select_best_question(&session.candidates, &session.asked)?
        {
            Some(choice) => choice.question,
            None => self
                .selector
                .fallback_question(&session.asked)?
                .ok_or(GameError::NoQuestionsAvailable)?,
        };

        session.state = SessionState::Questioning;
        let candidates_remaining = session.candidates.len();
        let session_id = self.sessions.insert(session);
        tracing::info!(
            session = %session_id,
            candidates = candidates_remaining,
            question = %question.id,
            "game started"
        );

        Ok(StartOutcome {
            session_id,
            question,
            progress: 0,
            candidates_remaining,
        })
    }

    /// Apply an answer and decide the next step.
    ///
    /// Answering after a guess is allowed: it resumes questioning.
    pub fn answer(
        &self,
        session_id: &SessionId,
        question_id: QuestionId,
        answer: Answer,
    ) -> TqResult<AnswerOutcome> {
        self.sessions.with_session(session_id, |session| {
            let question = self
                .store
                .question(question_id)?
                .ok_or(GameError::QuestionNotFound {
                    question_id: question_id.get(),
                })?;
            session.state = SessionState::Questioning;

            let value = answer.value();
            let values = self
                .selector
                .attribute_values(&question.attribute_key, &session.candidates);
            scoring::apply_answer(&session.candidates, &mut session.scores, &values, value);
            session.record_answer(question.id, &question.attribute_key, value);
            if let Err(e) = self.store.increment_ask_count(question.id) {
                tracing::warn!(question = %question.id, error = %e, "failed to bump ask count");
            }

            let before = session.candidates.len();
            session.candidates =
                scoring::filter_candidates(&session.candidates, &session.scores, &self.config.filter);
            tracing::debug!(
                session = %session.id,
                question = %question.id,
                key = %question.attribute_key,
                %answer,
                before,
                after = session.candidates.len(),
                count = session.question_count,
                "answer applied"
            );

            let policy = &self.config.policy;
            match policy.evaluate(&session.candidates, &session.scores, session.question_count) {
                Verdict::Guess { entity, forced } => {
                    let progress = if forced {
                        100
                    } else {
                        policy.progress(session.question_count)
                    };
                    return self.guess(session, entity, progress, forced);
                }
                Verdict::GiveUp => return Ok(self.give_up(session)),
                Verdict::Continue => {}
            }

            // The answer is already applied, so a failing catalogue read
            // ends questioning instead of failing the call.
            let next = self
                .selector
                .select_best_question(&session.candidates, &session.asked)
                .and_then(|choice| match choice {
                    Some(choice) => Ok(Some(choice.question)),
                    None if session.candidates.is_empty() => {
                        self.selector.fallback_question(&session.asked)
                    }
                    None => Ok(None),
                })
                .unwrap_or_else(|e| {
                    tracing::warn!(session = %session.id, error = %e, "question lookup failed, guessing now");
                    None
                });

            match next {
                Some(question) => Ok(AnswerOutcome::Question {
                    session_id: session.id.clone(),
                    question,
                    progress: policy.progress(session.question_count),
                    candidates_remaining: session.candidates.len(),
                    question_count: session.question_count,
                }),
                // Questions exhausted before convergence: guess what we have.
                None => match scoring::best_candidate(&session.candidates, &session.scores) {
                    Some(entity) => {
                        self.guess(session, entity, policy.progress(session.question_count), false)
                    }
                    None => Ok(self.give_up(session)),
                },
            }
        })
    }

    fn guess(
        &self,
        session: &mut GameSession,
        entity: EntityId,
        progress: u8,
        forced: bool,
    ) -> TqResult<AnswerOutcome> {
        session.state = SessionState::Guessing;
        session.last_guess = Some(entity);
        let meta = match self.store.entity(entity) {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                tracing::warn!(%entity, "guessed entity has no metadata");
                EntityMeta::new(entity, entity.to_string())
            }
            Err(e) => {
                tracing::warn!(%entity, error = %e, "entity lookup failed");
                EntityMeta::new(entity, entity.to_string())
            }
        };
        tracing::info!(
            session = %session.id,
            %entity,
            name = %meta.name,
            forced,
            questions = session.question_count,
            "guessing"
        );
        Ok(AnswerOutcome::Guess {
            session_id: session.id.clone(),
            entity: meta,
            progress,
            question_count: session.question_count,
        })
    }

    fn give_up(&self, session: &mut GameSession) -> AnswerOutcome {
        session.state = SessionState::Abandoned;
        tracing::info!(
            session = %session.id,
            questions = session.question_count,
            "no candidates left, giving up"
        );
        AnswerOutcome::GiveUp {
            session_id: session.id.clone(),
            message: GIVE_UP_MESSAGE.to_string(),
            progress: 100,
        }
    }

    /// Finalize a game: record it, bump counters, and run learning.
    ///
    /// Everything after the session is closed is best-effort; failures land
    /// in the returned [`LearningReport`].
    pub fn confirm(
        &self,
        session_id: &SessionId,
        entity: EntityId,
        correct: bool,
    ) -> TqResult<ConfirmOutcome> {
        let record = self.sessions.with_session(session_id, |session| {
            session.state = SessionState::Confirmed;
            Ok(session.completed(entity, correct))
        })?;
        tracing::info!(
            session = %session_id,
            %entity,
            correct,
            questions = record.question_count,
            "guess confirmed"
        );

        let mut persist_failures = 0;
        if let Err(e) = self.store.record_completed_session(&record) {
            tracing::warn!(session = %session_id, error = %e, "failed to record completed game");
            persist_failures += 1;
        }
        if let Err(e) = self.store.increment_entity_play_counters(entity, correct) {
            tracing::warn!(%entity, error = %e, "failed to update play counters");
            persist_failures += 1;
        }

        let mut learning = LearningFeedback::new(&*self.store, &self.config.learning).apply(&record);
        learning.failures += persist_failures;

        let message = if correct {
            format!("Great! I guessed it in {} questions!", record.question_count)
        } else {
            "I'll learn from this and do better next time.".to_string()
        };
        Ok(ConfirmOutcome {
            success: correct,
            message,
            questions_used: record.question_count,
            learning,
        })
    }

    /// Add an entity to the catalogue, typically one the engine failed to guess.
    ///
    /// A name already present (case-insensitively) leaves the catalogue
    /// untouched and returns the existing id with `false`.
    pub fn add_entity(&self, entity: NewEntity) -> TqResult<(EntityId, bool)> {
        let name = entity.name.clone();
        let attributes = entity.attributes.len();
        let (id, created) = self.store.insert_entity(entity)?;
        if created {
            tracing::info!(%id, %name, attributes, "entity added");
        } else {
            tracing::info!(%id, %name, "entity already known, not added");
        }
        Ok((id, created))
    }

    /// Discard a live game without recording anything.
    pub fn abandon(&self, session_id: &SessionId) -> TqResult<()> {
        self.sessions.with_session(session_id, |session| {
            session.state = SessionState::Abandoned;
            Ok(())
        })?;
        tracing::info!(session = %session_id, "game abandoned");
        Ok(())
    }

    /// Abandon sessions idle past the configured timeout. Returns how many.
    pub fn reap_idle_sessions(&self) -> usize {
        let reaped = self.sessions.reap_idle(self.config.sessions.idle_timeout());
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), "reaped idle sessions");
        }
        reaped.len()
    }

    /// Snapshot of a live session.
    pub fn session(&self, session_id: &SessionId) -> Option<GameSession> {
        self.sessions.snapshot(session_id)
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> TqResult<LearningStats> {
        Ok(learning::stats(&*self.store)?)
    }

    pub fn store(&self) -> &Arc<dyn Catalogue> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn info(&self) -> TqResult<EngineInfo> {
        Ok(EngineInfo {
            entities: self.store.entity_ids()?.len(),
            questions: self.store.questions()?.len(),
            completed_games: self.store.completed_sessions()?.len(),
            live_sessions: self.sessions.len(),
            persistent: self.config.data_dir.is_some(),
        })
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub entities: usize,
    pub questions: usize,
    pub completed_games: usize,
    pub live_sessions: usize,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "twenty-q engine info")?;
        writeln!(f, "  entities:        {}", self.entities)?;
        writeln!(f, "  questions:       {}", self.questions)?;
        writeln!(f, "  completed games: {}", self.completed_games)?;
        writeln!(f, "  live sessions:   {}", self.live_sessions)?;
        writeln!(f, "  persistent:      {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::{StoreError, TqError};
    use crate::model::{Attribute, AttributeValue, CompletedSession, NewEntity};
    use crate::store::mem::MemStore;
    use crate::store::{AttributeStore, QuestionCatalogue, SessionLog, StoreResult};

    fn engine_with(store: Arc<MemStore>) -> GameEngine {
        GameEngine::with_store(EngineConfig::default(), store).unwrap()
    }

    /// A: fictional human, B: real human, C: real non-human.
    fn abc_store() -> (Arc<MemStore>, QuestionId, QuestionId) {
        let store = Arc::new(MemStore::new());
        for (name, fictional, human) in [("A", 2, 2), ("B", -2, 2), ("C", -2, -2)] {
            store
                .insert_entity(
                    NewEntity::named(name)
                        .with("is_fictional", fictional)
                        .with("is_human", human),
                )
                .unwrap();
        }
        let (fictional, _) = store.insert_question("Is it fictional?", "is_fictional").unwrap();
        let (human, _) = store.insert_question("Is it a human?", "is_human").unwrap();
        (store, fictional, human)
    }

    fn next_question(outcome: AnswerOutcome) -> Question {
        match outcome {
            AnswerOutcome::Question { question, .. } => question,
            other => panic!("expected a question, got {other:?}"),
        }
    }

    #[test]
    fn start_without_questions_fails() {
        let engine = engine_with(Arc::new(MemStore::new()));
        let err = engine.start().unwrap_err();
        assert!(matches!(err, TqError::Game(GameError::NoQuestionsAvailable)));
        assert_eq!(engine.live_sessions(), 0);
    }

    #[test]
    fn start_with_empty_entity_pool_uses_fallback_question() {
        let store = Arc::new(MemStore::new());
        let (q, _) = store.insert_question("Is it alive?", "is_alive").unwrap();
        let engine = engine_with(store);
        let start = engine.start().unwrap();
        assert_eq!(start.question.id, q);
        assert_eq!(start.candidates_remaining, 0);
    }

    #[test]
    fn answering_no_to_fictional_then_asks_about_humans() {
        let (store, fictional, human) = abc_store();
        let engine = engine_with(store);

        let start = engine.start().unwrap();
        assert_eq!(start.candidates_remaining, 3);
        let first = start.question.id;

        // Whichever question came first, answer the fictional one with "no".
        let next = if first == fictional {
            next_question(engine.answer(&start.session_id, fictional, Answer::No).unwrap())
        } else {
            let q = next_question(engine.answer(&start.session_id, first, Answer::DontKnow).unwrap());
            assert_eq!(q.id, fictional);
            next_question(engine.answer(&start.session_id, fictional, Answer::No).unwrap())
        };
        assert_eq!(next.id, human);

        let session = engine.session(&start.session_id).unwrap();
        let score = |name: u64| session.scores[&EntityId::new(name).unwrap()];
        assert!(score(2) > score(1));
        assert!(score(3) > score(1));
    }

    #[test]
    fn first_question_splits_best() {
        let (store, fictional, _) = abc_store();
        // 2:1 splits on both keys; catalogue order breaks the tie.
        let engine = engine_with(store);
        assert_eq!(engine.start().unwrap().question.id, fictional);
    }

    #[test]
    fn unknown_question_is_rejected_without_side_effects() {
        let (store, _, _) = abc_store();
        let engine = engine_with(store);
        let start = engine.start().unwrap();
        let err = engine
            .answer(&start.session_id, QuestionId::new(999).unwrap(), Answer::Yes)
            .unwrap_err();
        assert!(matches!(
            err,
            TqError::Game(GameError::QuestionNotFound { question_id: 999 })
        ));
        assert_eq!(engine.session(&start.session_id).unwrap().question_count, 0);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (store, q, _) = abc_store();
        let engine = engine_with(store);
        let err = engine
            .answer(&SessionId::from("missing"), q, Answer::Yes)
            .unwrap_err();
        assert!(matches!(err, TqError::Game(GameError::SessionNotFound { .. })));
    }

    #[test]
    fn exhausted_questions_lead_to_a_guess_and_double_confirm_fails() {
        let (store, fictional, human) = abc_store();
        let engine = engine_with(store.clone());
        let start = engine.start().unwrap();
        engine.answer(&start.session_id, fictional, Answer::No).unwrap();
        let outcome = engine.answer(&start.session_id, human, Answer::Yes).unwrap();
        let guessed = match outcome {
            AnswerOutcome::Guess { entity, question_count, .. } => {
                assert_eq!(question_count, 2);
                entity
            }
            other => panic!("expected a guess, got {other:?}"),
        };
        assert_eq!(guessed.name, "B");

        let confirm = engine.confirm(&start.session_id, guessed.id, true).unwrap();
        assert!(confirm.success);
        assert_eq!(confirm.questions_used, 2);
        assert_eq!(confirm.learning.questions_updated, 2);
        assert_eq!(confirm.learning.failures, 0);
        assert_eq!(engine.live_sessions(), 0);

        let err = engine.confirm(&start.session_id, guessed.id, true).unwrap_err();
        assert!(matches!(err, TqError::Game(GameError::SessionNotFound { .. })));

        let meta = store.entity(guessed.id).unwrap().unwrap();
        assert_eq!((meta.times_played, meta.times_guessed), (1, 1));
        assert_eq!(store.completed_sessions().unwrap().len(), 1);
    }

    #[test]
    fn wrong_guess_updates_effectiveness_but_not_attributes() {
        let (store, fictional, human) = abc_store();
        let engine = engine_with(store.clone());
        let start = engine.start().unwrap();
        engine.answer(&start.session_id, fictional, Answer::No).unwrap();
        engine.answer(&start.session_id, human, Answer::ProbablyYes).unwrap();

        let b = EntityId::new(2).unwrap();
        let before = store.attribute(b, "is_human").unwrap();
        let confirm = engine.confirm(&start.session_id, b, false).unwrap();
        assert!(!confirm.success);
        assert_eq!(confirm.learning.attributes_reinforced, 0);
        assert_eq!(store.attribute(b, "is_human").unwrap(), before);
        let eff = store.question(human).unwrap().unwrap().effectiveness_score;
        assert!((eff - 0.995).abs() < 1e-12);
    }

    #[test]
    fn convergence_after_minimum_questions() {
        let store = Arc::new(MemStore::new());
        // Eight distinct entities over three binary keys, plus filler keys.
        for i in 0..8u8 {
            let mut entity = NewEntity::named(format!("e{i}"));
            for bit in 0..3 {
                entity = entity.with(&format!("bit{bit}"), if i >> bit & 1 == 1 { 2 } else { -2 });
            }
            store.insert_entity(entity).unwrap();
        }
        for bit in 0..3 {
            store
                .insert_question(&format!("Bit {bit}?"), &format!("bit{bit}"))
                .unwrap();
        }
        for n in 0..5 {
            store
                .insert_question(&format!("Filler {n}?"), &format!("filler{n}"))
                .unwrap();
        }
        let engine = engine_with(store);
        let start = engine.start().unwrap();
        let sid = start.session_id;
        let mut question = start.question;

        // Target is e5 = bits 1,0,1.
        let target = |key: &str| match key {
            "bit0" | "bit2" => Answer::Yes,
            "bit1" => Answer::No,
            _ => Answer::DontKnow,
        };
        for _ in 0..30 {
            match engine.answer(&sid, question.id, target(&question.attribute_key)).unwrap() {
                AnswerOutcome::Question { question: q, .. } => question = q,
                AnswerOutcome::Guess { entity, question_count, .. } => {
                    assert_eq!(entity.name, "e5");
                    assert!(question_count >= 5);
                    return;
                }
                AnswerOutcome::GiveUp { .. } => panic!("gave up"),
            }
        }
        panic!("never guessed");
    }

    #[test]
    fn abandon_and_reap_discard_sessions() {
        let (store, q, _) = abc_store();
        let engine = engine_with(store.clone());
        let a = engine.start().unwrap().session_id;
        engine.abandon(&a).unwrap();
        assert!(engine.answer(&a, q, Answer::Yes).is_err());
        assert!(engine.abandon(&a).is_err());

        let mut config = EngineConfig::default();
        config.sessions.idle_timeout_secs = 0;
        let engine = GameEngine::with_store(config, store.clone()).unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        assert_eq!(engine.reap_idle_sessions(), 2);
        assert_eq!(engine.live_sessions(), 0);
        assert!(store.completed_sessions().unwrap().is_empty());
    }

    #[test]
    fn answering_after_a_guess_resumes_questioning() {
        let store = Arc::new(MemStore::new());
        store
            .insert_entity(NewEntity::named("Solo").with("is_round", 2))
            .unwrap();
        for n in 0..6 {
            store
                .insert_question(&format!("Q{n}?"), &format!("k{n}"))
                .unwrap();
        }
        let engine = engine_with(store);
        let start = engine.start().unwrap();
        let sid = start.session_id;
        let mut q = start.question;
        let mut guessed = false;
        for _ in 0..5 {
            match engine.answer(&sid, q.id, Answer::DontKnow).unwrap() {
                AnswerOutcome::Question { question, .. } => q = question,
                AnswerOutcome::Guess { .. } => {
                    guessed = true;
                    break;
                }
                AnswerOutcome::GiveUp { .. } => panic!("gave up"),
            }
        }
        assert!(guessed);
        assert_eq!(
            engine.session(&sid).unwrap().state,
            SessionState::Guessing
        );
        // One question remains unasked; answering it is still accepted.
        let asked = engine.session(&sid).unwrap().asked;
        let remaining = engine
            .store()
            .questions()
            .unwrap()
            .into_iter()
            .find(|question| !asked.contains(&question.id))
            .unwrap();
        engine.answer(&sid, remaining.id, Answer::Yes).unwrap();
        assert_eq!(engine.session(&sid).unwrap().question_count, 6);
    }

    #[test]
    fn concurrent_answers_on_one_session_count_each_once() {
        let store = Arc::new(MemStore::new());
        for name in ["a", "b", "c", "d", "e", "f"] {
            store.insert_entity(NewEntity::named(name)).unwrap();
        }
        let mut questions = Vec::new();
        for n in 0..4 {
            questions.push(store.insert_question(&format!("Q{n}?"), &format!("k{n}")).unwrap().0);
        }
        let engine = Arc::new(engine_with(store));
        let sid = engine.start().unwrap().session_id;

        let handles: Vec<_> = questions
            .into_iter()
            .map(|q| {
                let engine = Arc::clone(&engine);
                let sid = sid.clone();
                std::thread::spawn(move || engine.answer(&sid, q, Answer::DontKnow).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let session = engine.session(&sid).unwrap();
        assert_eq!(session.question_count, 4);
        assert_eq!(session.asked.len(), 4);
        assert!(session.scores.values().all(|s| *s == 16));
    }

    /// Wraps a MemStore and fails attribute reads, catalogue listings, or
    /// learning writes on demand.
    struct FlakyStore {
        inner: MemStore,
        fail_reads: AtomicBool,
        fail_listing: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new(inner: MemStore) -> Self {
            Self {
                inner,
                fail_reads: AtomicBool::new(false),
                fail_listing: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
            if flag.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable {
                    message: "flaky".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl AttributeStore for FlakyStore {
        fn entity_ids(&self) -> StoreResult<Vec<EntityId>> {
            self.inner.entity_ids()
        }
        fn attribute_values(
            &self,
            key: &str,
            ids: &[EntityId],
        ) -> StoreResult<HashMap<EntityId, AttributeValue>> {
            self.check(&self.fail_reads)?;
            self.inner.attribute_values(key, ids)
        }
        fn attribute(&self, entity: EntityId, key: &str) -> StoreResult<Option<Attribute>> {
            self.inner.attribute(entity, key)
        }
        fn upsert_attribute(&self, entity: EntityId, key: &str, attr: Attribute) -> StoreResult<()> {
            self.check(&self.fail_writes)?;
            self.inner.upsert_attribute(entity, key, attr)
        }
        fn entity(&self, id: EntityId) -> StoreResult<Option<EntityMeta>> {
            self.inner.entity(id)
        }
        fn entities(&self) -> StoreResult<Vec<EntityMeta>> {
            self.inner.entities()
        }
        fn insert_entity(&self, entity: NewEntity) -> StoreResult<(EntityId, bool)> {
            self.inner.insert_entity(entity)
        }
        fn increment_entity_play_counters(&self, id: EntityId, ok: bool) -> StoreResult<()> {
            self.check(&self.fail_writes)?;
            self.inner.increment_entity_play_counters(id, ok)
        }
    }

    impl QuestionCatalogue for FlakyStore {
        fn questions(&self) -> StoreResult<Vec<Question>> {
            self.check(&self.fail_listing)?;
            self.inner.questions()
        }
        fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
            self.inner.question(id)
        }
        fn insert_question(&self, text: &str, key: &str) -> StoreResult<(QuestionId, bool)> {
            self.inner.insert_question(text, key)
        }
        fn increment_ask_count(&self, id: QuestionId) -> StoreResult<()> {
            self.check(&self.fail_writes)?;
            self.inner.increment_ask_count(id)
        }
        fn set_effectiveness(&self, id: QuestionId, eff: f64) -> StoreResult<()> {
            self.check(&self.fail_writes)?;
            self.inner.set_effectiveness(id, eff)
        }
    }

    impl SessionLog for FlakyStore {
        fn record_completed_session(&self, record: &CompletedSession) -> StoreResult<()> {
            self.check(&self.fail_writes)?;
            self.inner.record_completed_session(record)
        }
        fn completed_sessions(&self) -> StoreResult<Vec<CompletedSession>> {
            self.inner.completed_sessions()
        }
    }

    #[test]
    fn failing_attribute_reads_degrade_to_unknown() {
        let (inner, fictional, _) = abc_store();
        let inner = Arc::into_inner(inner).unwrap();
        let store = Arc::new(FlakyStore::new(inner));
        let engine = GameEngine::with_store(EngineConfig::default(), store.clone()).unwrap();
        let start = engine.start().unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        let outcome = engine.answer(&start.session_id, fictional, Answer::Yes).unwrap();
        assert!(matches!(outcome, AnswerOutcome::Question { .. }));
        let session = engine.session(&start.session_id).unwrap();
        assert_eq!(session.candidates.len(), 3);
        assert!(session.scores.values().all(|s| *s == 0));
    }

    #[test]
    fn failing_catalogue_listing_after_scoring_guesses_instead_of_failing() {
        let (inner, fictional, _) = abc_store();
        let inner = Arc::into_inner(inner).unwrap();
        let store = Arc::new(FlakyStore::new(inner));
        let engine = GameEngine::with_store(EngineConfig::default(), store.clone()).unwrap();
        let start = engine.start().unwrap();

        store.fail_listing.store(true, Ordering::SeqCst);
        let outcome = engine.answer(&start.session_id, fictional, Answer::No).unwrap();
        match outcome {
            AnswerOutcome::Guess { entity, question_count, .. } => {
                assert_eq!(entity.name, "B");
                assert_eq!(question_count, 1);
            }
            other => panic!("expected a guess, got {other:?}"),
        }

        let session = engine.session(&start.session_id).unwrap();
        assert_eq!(session.question_count, 1);
        let score = |raw: u64| session.scores[&EntityId::new(raw).unwrap()];
        assert_eq!((score(1), score(2), score(3)), (-4, 4, 4));
        assert_eq!(store.inner.question(fictional).unwrap().unwrap().times_asked, 1);
    }

    #[test]
    fn wrong_guess_can_teach_a_new_entity_from_the_answers() {
        let (store, fictional, human) = abc_store();
        let engine = engine_with(store.clone());
        let start = engine.start().unwrap();
        engine.answer(&start.session_id, fictional, Answer::No).unwrap();
        engine.answer(&start.session_id, human, Answer::ProbablyYes).unwrap();

        let answers = engine.session(&start.session_id).unwrap().answers;
        engine
            .confirm(&start.session_id, EntityId::new(2).unwrap(), false)
            .unwrap();

        let (id, created) = engine
            .add_entity(NewEntity::named("Marie Curie").with_answers(&answers))
            .unwrap();
        assert!(created);
        let learned = store.attribute(id, "is_human").unwrap().unwrap();
        assert_eq!(learned.value.get(), 1);
        assert_eq!(learned.confidence, 1.0);
        assert_eq!(store.attribute(id, "is_fictional").unwrap().unwrap().value.get(), -2);

        let (again, created) = engine.add_entity(NewEntity::named("marie curie")).unwrap();
        assert!(!created);
        assert_eq!(again, id);
        assert_eq!(store.entities().unwrap().len(), 4);
        assert_eq!(engine.start().unwrap().candidates_remaining, 4);
    }

    #[test]
    fn failing_learning_writes_do_not_fail_confirm() {
        let (inner, fictional, human) = abc_store();
        let inner = Arc::into_inner(inner).unwrap();
        let store = Arc::new(FlakyStore::new(inner));
        let engine = GameEngine::with_store(EngineConfig::default(), store.clone()).unwrap();
        let start = engine.start().unwrap();
        engine.answer(&start.session_id, fictional, Answer::No).unwrap();
        engine.answer(&start.session_id, human, Answer::Yes).unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let confirm = engine
            .confirm(&start.session_id, EntityId::new(2).unwrap(), true)
            .unwrap();
        assert!(confirm.success);
        // record + counters + 2 effectiveness writes + 2 attribute writes
        assert_eq!(confirm.learning.failures, 6);
        assert_eq!(engine.live_sessions(), 0);
    }
}
