//! Persistence and recovery tests for the twenty-q engine.
//!
//! These tests verify that the catalogue, learned effectiveness, attribute
//! reinforcement, play counters, and completed-game records survive an
//! engine restart on the redb store.

use twenty_q::config::EngineConfig;
use twenty_q::engine::{AnswerOutcome, GameEngine};
use twenty_q::model::{AttributeValue, NewEntity};

fn persistent_engine(dir: &std::path::Path) -> GameEngine {
    GameEngine::new(EngineConfig {
        data_dir: Some(dir.to_path_buf()),
        ..Default::default()
    })
    .unwrap()
}

fn seed(engine: &GameEngine) {
    let store = engine.store();
    store
        .insert_entity(
            NewEntity::named("Elsa")
                .with("is_fictional", 2)
                .with("has_magic", 2),
        )
        .unwrap();
    store
        .insert_entity(
            NewEntity::named("Einstein")
                .with("is_fictional", -2)
                .with("has_magic", -2),
        )
        .unwrap();
    store.insert_question("Is it fictional?", "is_fictional").unwrap();
    store.insert_question("Does it have magic?", "has_magic").unwrap();
    store.insert_question("Does it wear a crown?", "wears_crown").unwrap();
}

#[test]
fn catalogue_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let engine = persistent_engine(dir.path());
        seed(&engine);
    }
    {
        let engine = persistent_engine(dir.path());
        let info = engine.info().unwrap();
        assert_eq!(info.entities, 2);
        assert_eq!(info.questions, 3);
        assert!(info.persistent);

        // Re-seeding is a no-op thanks to the not-exists check.
        seed(&engine);
        assert_eq!(engine.store().entities().unwrap().len(), 2);
        let (_, created) = engine
            .store()
            .insert_entity(NewEntity::named("ELSA"))
            .unwrap();
        assert!(!created);
    }
}

#[test]
fn learning_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let (elsa, crown_q) = {
        let engine = persistent_engine(dir.path());
        seed(&engine);
        let crown_q = engine
            .store()
            .questions()
            .unwrap()
            .into_iter()
            .find(|q| q.attribute_key == "wears_crown")
            .unwrap()
            .id;

        let start = engine.start().unwrap();
        let sid = start.session_id;
        let mut question = start.question;
        let elsa = loop {
            let answer = match question.attribute_key.as_str() {
                "wears_crown" => twenty_q::model::Answer::ProbablyYes,
                _ => twenty_q::model::Answer::Yes,
            };
            match engine.answer(&sid, question.id, answer).unwrap() {
                AnswerOutcome::Question { question: next, .. } => question = next,
                AnswerOutcome::Guess { entity, .. } => break entity,
                AnswerOutcome::GiveUp { .. } => panic!("gave up"),
            }
        };
        assert_eq!(elsa.name, "Elsa");
        let confirm = engine.confirm(&sid, elsa.id, true).unwrap();
        assert_eq!(confirm.learning.failures, 0);
        assert_eq!(confirm.learning.attributes_created, 1);
        (elsa.id, crown_q)
    };

    let engine = persistent_engine(dir.path());
    let store = engine.store();

    let sessions = store.completed_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].success);
    assert_eq!(sessions[0].question_count, 3);

    let meta = store.entity(elsa).unwrap().unwrap();
    assert_eq!(meta.times_played, 1);
    assert_eq!(meta.times_guessed, 1);

    let crown = store.attribute(elsa, "wears_crown").unwrap().unwrap();
    assert_eq!(crown.value, AttributeValue::new(1).unwrap());
    assert_eq!(crown.confidence, 0.7);

    let q = store.question(crown_q).unwrap().unwrap();
    assert_eq!(q.times_asked, 1);
    assert!(q.effectiveness_score > 1.0);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_games, 1);
    assert_eq!(stats.avg_questions, 3.0);
}

#[test]
fn config_file_drives_engine_location() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let config = EngineConfig {
        data_dir: Some(dir.path().join("data")),
        ..Default::default()
    };
    config.save(&config_path).unwrap();

    let loaded = EngineConfig::load(&config_path).unwrap();
    {
        let engine = GameEngine::new(loaded.clone()).unwrap();
        seed(&engine);
    }
    assert!(dir.path().join("data").join("twenty-q.redb").exists());
    let engine = GameEngine::new(loaded).unwrap();
    assert_eq!(engine.store().questions().unwrap().len(), 3);
}
