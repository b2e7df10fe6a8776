//! Live game sessions and the concurrent table that holds them.
//!
//! Each session sits behind its own mutex inside a [`DashMap`]. Every engine
//! operation locks the session for its whole duration, so two requests on
//! the same id are serialized while different ids proceed in parallel. A
//! session that reaches a terminal state is removed from the table; anyone
//! still waiting on its mutex observes the terminal state and reports
//! `SessionNotFound`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GameError, TqResult};
use crate::model::{AttributeValue, CompletedSession, EntityId, QuestionId, SessionId, unix_now};
use crate::scoring::Scores;

/// Lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created; no question handed out yet.
    Init,
    /// Asking questions and accepting answers.
    Questioning,
    /// A guess was emitted and awaits confirmation.
    Guessing,
    /// The player confirmed (or rejected) a guess. Terminal.
    Confirmed,
    /// Gave up, abandoned by the caller, or reaped. Terminal.
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Confirmed | SessionState::Abandoned)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::Questioning => "questioning",
            SessionState::Guessing => "guessing",
            SessionState::Confirmed => "confirmed",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Idle-session expiry settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions untouched for longer than this are abandoned by the reaper.
    pub idle_timeout_secs: u64,
    /// How often a long-running host should call the reaper.
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reap_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// One game's complete mutable state.
///
/// Invariant: every id in `candidates` has an entry in `scores`.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: SessionId,
    pub state: SessionState,
    /// Remaining candidates, in store order after filtering.
    pub candidates: Vec<EntityId>,
    pub scores: Scores,
    /// Questions already answered. Only grows.
    pub asked: HashSet<QuestionId>,
    /// Same questions, in the order they were first answered.
    pub asked_order: Vec<QuestionId>,
    /// Attribute key → last answer value given.
    pub answers: BTreeMap<String, AttributeValue>,
    pub question_count: u32,
    /// The entity most recently guessed, if any.
    pub last_guess: Option<EntityId>,
    last_touched: Instant,
}

impl GameSession {
    /// A fresh session with every entity as a candidate at score 0.
    pub fn new(candidates: Vec<EntityId>) -> Self {
        let scores = candidates.iter().map(|id| (*id, 0)).collect();
        Self {
            id: SessionId::generate(),
            state: SessionState::Init,
            candidates,
            scores,
            asked: HashSet::new(),
            asked_order: Vec::new(),
            answers: BTreeMap::new(),
            question_count: 0,
            last_guess: None,
            last_touched: Instant::now(),
        }
    }

    /// Register an answer to `question` probing `attribute_key`.
    pub fn record_answer(&mut self, question: QuestionId, attribute_key: &str, value: AttributeValue) {
        if self.asked.insert(question) {
            self.asked_order.push(question);
        }
        self.answers.insert(attribute_key.to_string(), value);
        self.question_count += 1;
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    /// Summary record for a finished game.
    pub fn completed(&self, guessed_entity: EntityId, success: bool) -> CompletedSession {
        CompletedSession {
            session_id: self.id.clone(),
            target_entity: success.then_some(guessed_entity),
            guessed_entity,
            success,
            questions_asked: self.asked_order.clone(),
            answers: self.answers.clone(),
            question_count: self.question_count,
            finished_at: unix_now(),
        }
    }
}

/// Process-wide table of live sessions with per-session locking.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<Mutex<GameSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session and return its id.
    pub fn insert(&self, session: GameSession) -> SessionId {
        let id = session.id.clone();
        self.sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        id
    }

    /// Run `f` with exclusive access to a live session.
    ///
    /// Fails with `SessionNotFound` if the id is unknown or the session
    /// reached a terminal state while we waited for it. When `f` leaves the
    /// session terminal, it is removed from the table.
    pub fn with_session<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut GameSession) -> TqResult<R>,
    ) -> TqResult<R> {
        let not_found = || GameError::SessionNotFound {
            session_id: id.to_string(),
        };
        // Clone the Arc so the shard lock is released before we block on the session.
        let slot = self
            .sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(not_found)?;

        let (result, terminal) = {
            let mut session = slot.lock().map_err(|_| GameError::SessionBusy {
                session_id: id.to_string(),
            })?;
            if session.state.is_terminal() {
                return Err(not_found().into());
            }
            session.touch();
            let result = f(&mut *session);
            (result, session.state.is_terminal())
        };

        if terminal {
            self.sessions.remove(id);
        }
        result
    }

    /// Abandon every session idle for at least `max_idle`. Sessions currently
    /// in use are skipped. Returns the reaped ids.
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, slot| match slot.try_lock() {
            Ok(mut session) if session.idle_for() >= max_idle => {
                session.state = SessionState::Abandoned;
                reaped.push(id.clone());
                false
            }
            Ok(_) | Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => {
                reaped.push(id.clone());
                false
            }
        });
        reaped
    }

    /// Snapshot of a live session, for inspection.
    pub fn snapshot(&self, id: &SessionId) -> Option<GameSession> {
        let slot = self.sessions.get(id).map(|e| Arc::clone(e.value()))?;
        let session = slot.lock().ok()?;
        Some(session.clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
