//! ACID-durable catalogue backed by redb.
//!
//! Each record kind lives in its own table with bincode-encoded values.
//! Read-modify-write updates (ask counters, play counters, effectiveness)
//! run inside a single write transaction, so concurrent updates never
//! lose increments.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::model::{
    Attribute, AttributeValue, CompletedSession, EntityId, EntityMeta, NewEntity, Question,
    QuestionId,
};
use crate::store::{AttributeStore, QuestionCatalogue, SessionLog, StoreResult};

/// u64-keyed table of bincode records.
type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Entity id → `EntityMeta`.
const ENTITY_TABLE: RecordTable = TableDefinition::new("entities");
/// Lowercased entity name → entity id.
const ENTITY_NAME_TABLE: TableDefinition<&str, u64> = TableDefinition::new("entity_names");
/// (entity id, attribute key) → `Attribute`.
const ATTRIBUTE_TABLE: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("attributes");
/// Question id → `Question`.
const QUESTION_TABLE: RecordTable = TableDefinition::new("questions");
/// Question text → question id.
const QUESTION_TEXT_TABLE: TableDefinition<&str, u64> = TableDefinition::new("question_texts");
/// Session id → `CompletedSession`.
const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("completed_sessions");

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "twenty-q.redb";

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to serialize record: {e}"),
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to deserialize record: {e}"),
    })
}

/// ACID-durable catalogue using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DB_FILE);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create every table up front so read transactions never see a missing one.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        {
            txn.open_table(ENTITY_TABLE).map_err(redb_err("open_table"))?;
            txn.open_table(ENTITY_NAME_TABLE)
                .map_err(redb_err("open_table"))?;
            txn.open_table(ATTRIBUTE_TABLE)
                .map_err(redb_err("open_table"))?;
            txn.open_table(QUESTION_TABLE)
                .map_err(redb_err("open_table"))?;
            txn.open_table(QUESTION_TEXT_TABLE)
                .map_err(redb_err("open_table"))?;
            txn.open_table(SESSION_TABLE).map_err(redb_err("open_table"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;

        tracing::debug!(path = %db_path.display(), "opened durable catalogue");
        Ok(Self { db: Arc::new(db) })
    }

    /// Decode every value of a u64-keyed table, in key order.
    fn scan<T: DeserializeOwned>(&self, def: RecordTable) -> StoreResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(def).map_err(redb_err("open_table"))?;
        let mut out = Vec::new();
        for item in table.iter().map_err(redb_err("iter"))? {
            let (_, value) = item.map_err(redb_err("iter"))?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn get<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        key: u64,
    ) -> StoreResult<Option<T>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(def).map_err(redb_err("open_table"))?;
        let result = table.get(key).map_err(redb_err("get"))?;
        result.map(|guard| decode(guard.value())).transpose()
    }

    /// Read, modify, and write back one record inside a single write transaction.
    fn update<T, F>(&self, def: RecordTable, key: u64, f: F) -> StoreResult<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn.open_table(def).map_err(redb_err("open_table"))?;
            // Copy the bytes out so the read guard is gone before the insert.
            let current = table
                .get(key)
                .map_err(redb_err("get"))?
                .map(|guard| guard.value().to_vec());
            let mut record: T = match current {
                Some(bytes) => decode(&bytes)?,
                None => {
                    return Err(StoreError::NotFound {
                        key: format!("{}:{key}", def.name()),
                    });
                }
            };
            f(&mut record);
            let bytes = encode(&record)?;
            table
                .insert(key, bytes.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    /// Next free id in a u64-keyed table (max key + 1, starting from 1).
    fn next_id(table: &redb::Table<'_, u64, &'static [u8]>) -> StoreResult<u64> {
        let last = table.last().map_err(redb_err("last"))?;
        Ok(last.map(|(k, _)| k.value() + 1).unwrap_or(1))
    }
}

impl AttributeStore for DurableStore {
    fn entity_ids(&self) -> StoreResult<Vec<EntityId>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(ENTITY_TABLE).map_err(redb_err("open_table"))?;
        let mut ids = Vec::new();
        for item in table.iter().map_err(redb_err("iter"))? {
            let (key, _) = item.map_err(redb_err("iter"))?;
            ids.extend(EntityId::new(key.value()));
        }
        Ok(ids)
    }

    fn attribute_values(
        &self,
        key: &str,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, AttributeValue>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(ATTRIBUTE_TABLE)
            .map_err(redb_err("open_table"))?;
        let mut values = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(guard) = table.get((id.get(), key)).map_err(redb_err("get"))? {
                let attribute: Attribute = decode(guard.value())?;
                values.insert(*id, attribute.value);
            }
        }
        Ok(values)
    }

    fn attribute(&self, entity: EntityId, key: &str) -> StoreResult<Option<Attribute>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(ATTRIBUTE_TABLE)
            .map_err(redb_err("open_table"))?;
        let result = table.get((entity.get(), key)).map_err(redb_err("get"))?;
        result.map(|guard| decode(guard.value())).transpose()
    }

    fn upsert_attribute(
        &self,
        entity: EntityId,
        key: &str,
        attribute: Attribute,
    ) -> StoreResult<()> {
        let bytes = encode(&attribute)?;
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let entities = txn.open_table(ENTITY_TABLE).map_err(redb_err("open_table"))?;
            if entities
                .get(entity.get())
                .map_err(redb_err("get"))?
                .is_none()
            {
                return Err(StoreError::NotFound {
                    key: entity.to_string(),
                });
            }
            let mut table = txn
                .open_table(ATTRIBUTE_TABLE)
                .map_err(redb_err("open_table"))?;
            table
                .insert((entity.get(), key), bytes.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    fn entity(&self, id: EntityId) -> StoreResult<Option<EntityMeta>> {
        self.get(ENTITY_TABLE, id.get())
    }

    fn entities(&self) -> StoreResult<Vec<EntityMeta>> {
        self.scan(ENTITY_TABLE)
    }

    fn insert_entity(&self, entity: NewEntity) -> StoreResult<(EntityId, bool)> {
        let normalized = entity.name.to_lowercase();
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let id = {
            let mut names = txn
                .open_table(ENTITY_NAME_TABLE)
                .map_err(redb_err("open_table"))?;
            if let Some(existing) = names.get(normalized.as_str()).map_err(redb_err("get"))? {
                let id = existing.value();
                return EntityId::new(id)
                    .map(|id| (id, false))
                    .ok_or_else(|| StoreError::NotFound {
                        key: format!("entity:{id}"),
                    });
            }

            let mut entities = txn.open_table(ENTITY_TABLE).map_err(redb_err("open_table"))?;
            let raw = Self::next_id(&entities)?;
            let id = EntityId::new(raw).ok_or_else(|| StoreError::Unavailable {
                message: "entity id space exhausted".into(),
            })?;
            let mut meta = EntityMeta::new(id, entity.name);
            meta.description = entity.description;
            meta.image_url = entity.image_url;
            let bytes = encode(&meta)?;
            entities
                .insert(raw, bytes.as_slice())
                .map_err(redb_err("insert"))?;
            names
                .insert(normalized.as_str(), raw)
                .map_err(redb_err("insert"))?;

            let mut attributes = txn
                .open_table(ATTRIBUTE_TABLE)
                .map_err(redb_err("open_table"))?;
            for (key, attribute) in entity.attributes.iter() {
                let bytes = encode(attribute)?;
                attributes
                    .insert((raw, key.as_str()), bytes.as_slice())
                    .map_err(redb_err("insert"))?;
            }
            id
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok((id, true))
    }

    fn increment_entity_play_counters(
        &self,
        id: EntityId,
        guessed_correctly: bool,
    ) -> StoreResult<()> {
        self.update(ENTITY_TABLE, id.get(), |meta: &mut EntityMeta| {
            meta.times_played += 1;
            if guessed_correctly {
                meta.times_guessed += 1;
            }
        })
    }
}

impl QuestionCatalogue for DurableStore {
    fn questions(&self) -> StoreResult<Vec<Question>> {
        self.scan(QUESTION_TABLE)
    }

    fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        self.get(QUESTION_TABLE, id.get())
    }

    fn insert_question(&self, text: &str, attribute_key: &str) -> StoreResult<(QuestionId, bool)> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let id = {
            let mut texts = txn
                .open_table(QUESTION_TEXT_TABLE)
                .map_err(redb_err("open_table"))?;
            if let Some(existing) = texts.get(text).map_err(redb_err("get"))? {
                let id = existing.value();
                return QuestionId::new(id)
                    .map(|id| (id, false))
                    .ok_or_else(|| StoreError::NotFound {
                        key: format!("q:{id}"),
                    });
            }

            let mut questions = txn
                .open_table(QUESTION_TABLE)
                .map_err(redb_err("open_table"))?;
            let raw = Self::next_id(&questions)?;
            let id = QuestionId::new(raw).ok_or_else(|| StoreError::Unavailable {
                message: "question id space exhausted".into(),
            })?;
            let bytes = encode(&Question::new(id, text, attribute_key))?;
            questions
                .insert(raw, bytes.as_slice())
                .map_err(redb_err("insert"))?;
            texts.insert(text, raw).map_err(redb_err("insert"))?;
            id
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok((id, true))
    }

    fn increment_ask_count(&self, id: QuestionId) -> StoreResult<()> {
        self.update(QUESTION_TABLE, id.get(), |q: &mut Question| {
            q.times_asked += 1;
        })
    }

    fn set_effectiveness(&self, id: QuestionId, effectiveness: f64) -> StoreResult<()> {
        self.update(QUESTION_TABLE, id.get(), |q: &mut Question| {
            q.effectiveness_score = effectiveness;
        })
    }
}

impl SessionLog for DurableStore {
    fn record_completed_session(&self, record: &CompletedSession) -> StoreResult<()> {
        let bytes = encode(record)?;
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn
                .open_table(SESSION_TABLE)
                .map_err(redb_err("open_table"))?;
            table
                .insert(record.session_id.as_str(), bytes.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    fn completed_sessions(&self) -> StoreResult<Vec<CompletedSession>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(SESSION_TABLE)
            .map_err(redb_err("open_table"))?;
        let mut out: Vec<CompletedSession> = Vec::new();
        for item in table.iter().map_err(redb_err("iter"))? {
            let (_, value) = item.map_err(redb_err("iter"))?;
            out.push(decode(value.value())?);
        }
        out.sort_by(|a, b| {
            a.finished_at
                .cmp(&b.finished_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(out)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    use crate::model::SessionId;

    #[test]
    fn entity_roundtrip_with_attributes() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        let (id, created) = store
            .insert_entity(
                NewEntity::named("Albert Einstein")
                    .with("is_real", 2)
                    .with("is_fictional", -2),
            )
            .unwrap();
        assert!(created);
        assert_eq!(store.entity(id).unwrap().unwrap().name, "Albert Einstein");

        let values = store.attribute_values("is_fictional", &[id]).unwrap();
        assert_eq!(values[&id].get(), -2);
        assert_eq!(store.attribute(id, "is_real").unwrap().unwrap().confidence, 1.0);
        assert!(store.attribute(id, "has_magic").unwrap().is_none());
    }

    #[test]
    fn insert_entity_is_idempotent_by_name() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let (a, _) = store.insert_entity(NewEntity::named("Cleopatra")).unwrap();
        let (b, created) = store.insert_entity(NewEntity::named("CLEOPATRA")).unwrap();
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(store.entities().unwrap().len(), 1);
    }

    #[test]
    fn question_counters_update_in_place() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let (q, _) = store.insert_question("Does it wear glasses?", "wears_glasses").unwrap();
        store.increment_ask_count(q).unwrap();
        store.increment_ask_count(q).unwrap();
        store.set_effectiveness(q, 0.9).unwrap();
        let stored = store.question(q).unwrap().unwrap();
        assert_eq!(stored.times_asked, 2);
        assert_eq!(stored.effectiveness_score, 0.9);
    }

    #[test]
    fn play_counters_accumulate_across_reopens() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = DurableStore::open(dir.path()).unwrap();
            let (id, _) = store.insert_entity(NewEntity::named("Cleopatra")).unwrap();
            store.increment_entity_play_counters(id, true).unwrap();
            store.increment_entity_play_counters(id, false).unwrap();
            id
        };

        let store = DurableStore::open(dir.path()).unwrap();
        store.increment_entity_play_counters(id, true).unwrap();
        let meta = store.entity(id).unwrap().unwrap();
        assert_eq!(meta.times_played, 3);
        assert_eq!(meta.times_guessed, 2);
        assert_eq!(meta.name, "Cleopatra");
    }

    #[test]
    fn updating_unknown_question_fails() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let ghost = QuestionId::new(7).unwrap();
        assert!(matches!(
            store.increment_ask_count(ghost),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn completed_sessions_persist_across_reopens() {
        let dir = TempDir::new().unwrap();
        let record = CompletedSession {
            session_id: SessionId::from("s-1"),
            target_entity: None,
            guessed_entity: EntityId::new(1).unwrap(),
            success: true,
            questions_asked: vec![QuestionId::new(3).unwrap(), QuestionId::new(1).unwrap()],
            answers: BTreeMap::from([("is_real".to_string(), AttributeValue::new(2).unwrap())]),
            question_count: 2,
            finished_at: 1_700_000_000,
        };

        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.record_completed_session(&record).unwrap();
        }

        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.completed_sessions().unwrap(), vec![record]);
    }
}
