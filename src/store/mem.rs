//! In-memory catalogue backed by DashMap.
//!
//! Fastest backend, used for tests and for servers that are seeded at
//! startup. All data is lost on process exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::error::StoreError;
use crate::model::{
    Attribute, AttributeValue, CompletedSession, Entity, EntityId, EntityMeta, NewEntity,
    Question, QuestionId, SessionId,
};
use crate::store::{AttributeStore, QuestionCatalogue, SessionLog, StoreResult};

/// Concurrent in-memory catalogue using sharded hashmaps.
#[derive(Debug)]
pub struct MemStore {
    entities: DashMap<EntityId, Entity>,
    /// Normalized (lowercase) entity name → id.
    entity_names: DashMap<String, EntityId>,
    questions: DashMap<QuestionId, Question>,
    /// Question text → id.
    question_texts: DashMap<String, QuestionId>,
    sessions: DashMap<SessionId, CompletedSession>,
    next_entity: AtomicU64,
    next_question: AtomicU64,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            entity_names: DashMap::new(),
            questions: DashMap::new(),
            question_texts: DashMap::new(),
            sessions: DashMap::new(),
            next_entity: AtomicU64::new(1),
            next_question: AtomicU64::new(1),
        }
    }

    fn allocate(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_entity(id: EntityId) -> StoreError {
    StoreError::NotFound {
        key: id.to_string(),
    }
}

impl AttributeStore for MemStore {
    fn entity_ids(&self) -> StoreResult<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = self.entities.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn attribute_values(
        &self,
        key: &str,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, AttributeValue>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                let entity = self.entities.get(id)?;
                entity.attributes.get(key).map(|a| (*id, a.value))
            })
            .collect())
    }

    fn attribute(&self, entity: EntityId, key: &str) -> StoreResult<Option<Attribute>> {
        Ok(self
            .entities
            .get(&entity)
            .and_then(|e| e.attributes.get(key).copied()))
    }

    fn upsert_attribute(
        &self,
        entity: EntityId,
        key: &str,
        attribute: Attribute,
    ) -> StoreResult<()> {
        let mut e = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| missing_entity(entity))?;
        e.attributes.set(key, attribute);
        Ok(())
    }

    fn entity(&self, id: EntityId) -> StoreResult<Option<EntityMeta>> {
        Ok(self.entities.get(&id).map(|e| e.meta.clone()))
    }

    fn entities(&self) -> StoreResult<Vec<EntityMeta>> {
        let mut all: Vec<EntityMeta> = self.entities.iter().map(|e| e.meta.clone()).collect();
        all.sort_unstable_by_key(|m| m.id);
        Ok(all)
    }

    fn insert_entity(&self, entity: NewEntity) -> StoreResult<(EntityId, bool)> {
        match self.entity_names.entry(entity.name.to_lowercase()) {
            MapEntry::Occupied(existing) => Ok((*existing.get(), false)),
            MapEntry::Vacant(slot) => {
                let id = EntityId::new(Self::allocate(&self.next_entity)).ok_or_else(|| {
                    StoreError::Unavailable {
                        message: "entity id space exhausted".into(),
                    }
                })?;
                let mut meta = EntityMeta::new(id, entity.name);
                meta.description = entity.description;
                meta.image_url = entity.image_url;
                self.entities.insert(
                    id,
                    Entity {
                        meta,
                        attributes: entity.attributes,
                    },
                );
                slot.insert(id);
                Ok((id, true))
            }
        }
    }

    fn increment_entity_play_counters(
        &self,
        id: EntityId,
        guessed_correctly: bool,
    ) -> StoreResult<()> {
        let mut e = self.entities.get_mut(&id).ok_or_else(|| missing_entity(id))?;
        e.meta.times_played += 1;
        if guessed_correctly {
            e.meta.times_guessed += 1;
        }
        Ok(())
    }
}

impl QuestionCatalogue for MemStore {
    fn questions(&self) -> StoreResult<Vec<Question>> {
        let mut all: Vec<Question> = self.questions.iter().map(|q| q.value().clone()).collect();
        all.sort_unstable_by_key(|q| q.id);
        Ok(all)
    }

    fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        Ok(self.questions.get(&id).map(|q| q.value().clone()))
    }

    fn insert_question(&self, text: &str, attribute_key: &str) -> StoreResult<(QuestionId, bool)> {
        match self.question_texts.entry(text.to_string()) {
            MapEntry::Occupied(existing) => Ok((*existing.get(), false)),
            MapEntry::Vacant(slot) => {
                let id = QuestionId::new(Self::allocate(&self.next_question)).ok_or_else(|| {
                    StoreError::Unavailable {
                        message: "question id space exhausted".into(),
                    }
                })?;
                self.questions
                    .insert(id, Question::new(id, text, attribute_key));
                slot.insert(id);
                Ok((id, true))
            }
        }
    }

    fn increment_ask_count(&self, id: QuestionId) -> StoreResult<()> {
        let mut q = self.questions.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            key: id.to_string(),
        })?;
        q.times_asked += 1;
        Ok(())
    }

    fn set_effectiveness(&self, id: QuestionId, effectiveness: f64) -> StoreResult<()> {
        let mut q = self.questions.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            key: id.to_string(),
        })?;
        q.effectiveness_score = effectiveness;
        Ok(())
    }
}

impl SessionLog for MemStore {
    fn record_completed_session(&self, record: &CompletedSession) -> StoreResult<()> {
        self.sessions
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn completed_sessions(&self) -> StoreResult<Vec<CompletedSession>> {
        let mut all: Vec<CompletedSession> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| {
            a.finished_at
                .cmp(&b.finished_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(all)
    }
}
