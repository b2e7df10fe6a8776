//! Collaborator contracts for the game engine, plus two implementations.
//!
//! The engine never touches storage directly; it talks to three traits:
//!
//! - [`AttributeStore`]: entity catalogue with sparse attribute vectors
//! - [`QuestionCatalogue`]: questions, ask counters, effectiveness scores
//! - [`SessionLog`]: completed-game records consumed by learning
//!
//! [`Catalogue`] bundles all three. Two backends implement it:
//! [`mem::MemStore`] (DashMap, process lifetime) and
//! [`durable::DurableStore`] (redb, ACID on disk).

pub mod durable;
pub mod mem;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{
    Attribute, AttributeValue, CompletedSession, EntityId, EntityMeta, NewEntity, Question,
    QuestionId,
};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Entity catalogue with queryable attribute vectors.
pub trait AttributeStore: Send + Sync {
    /// All entity ids, ascending.
    fn entity_ids(&self) -> StoreResult<Vec<EntityId>>;

    /// Known values of `key` for the given entities.
    ///
    /// Entities without a stored value for `key` are absent from the map.
    fn attribute_values(
        &self,
        key: &str,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, AttributeValue>>;

    /// Full stored attribute (value and confidence), if any.
    fn attribute(&self, entity: EntityId, key: &str) -> StoreResult<Option<Attribute>>;

    /// Insert or replace one attribute of an entity.
    fn upsert_attribute(&self, entity: EntityId, key: &str, attribute: Attribute)
    -> StoreResult<()>;

    fn entity(&self, id: EntityId) -> StoreResult<Option<EntityMeta>>;

    fn entities(&self) -> StoreResult<Vec<EntityMeta>>;

    /// Insert an entity unless one with the same (case-insensitive) name exists.
    ///
    /// Returns the id and whether a new entity was created.
    fn insert_entity(&self, entity: NewEntity) -> StoreResult<(EntityId, bool)>;

    /// Bump `times_played`, and `times_guessed` when the guess was right.
    fn increment_entity_play_counters(
        &self,
        id: EntityId,
        guessed_correctly: bool,
    ) -> StoreResult<()>;
}

/// The question catalogue.
pub trait QuestionCatalogue: Send + Sync {
    /// All questions in catalogue order (id ascending).
    fn questions(&self) -> StoreResult<Vec<Question>>;

    fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        Ok(self.questions()?.into_iter().find(|q| q.id == id))
    }

    /// Insert a question unless one with identical text exists.
    fn insert_question(&self, text: &str, attribute_key: &str) -> StoreResult<(QuestionId, bool)>;

    fn increment_ask_count(&self, id: QuestionId) -> StoreResult<()>;

    fn set_effectiveness(&self, id: QuestionId, effectiveness: f64) -> StoreResult<()>;
}

/// Sink and source of completed-game records.
pub trait SessionLog: Send + Sync {
    fn record_completed_session(&self, record: &CompletedSession) -> StoreResult<()>;

    /// All records, oldest first.
    fn completed_sessions(&self) -> StoreResult<Vec<CompletedSession>>;
}

/// Everything the engine needs from storage.
pub trait Catalogue: AttributeStore + QuestionCatalogue + SessionLog {}

impl<T: AttributeStore + QuestionCatalogue + SessionLog> Catalogue for T {}

/// Open the configured backend: durable when a data directory is given,
/// memory-only otherwise.
pub fn open(data_dir: Option<&Path>) -> StoreResult<Arc<dyn Catalogue>> {
    match data_dir {
        Some(dir) => Ok(Arc::new(durable::DurableStore::open(dir)?)),
        None => Ok(Arc::new(mem::MemStore::new())),
    }
}
