// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # twenty-q
//!
//! An adaptive twenty-questions inference engine. Given a pool of entities
//! described by sparse signed attribute vectors, it asks the question that
//! best splits the remaining candidates, scores every candidate against each
//! answer, decides when to commit to a guess, and learns from confirmed
//! games.
//!
//! ## Architecture
//!
//! - **Selection** (`select`): entropy-based information gain weighted by
//!   learned question effectiveness
//! - **Scoring** (`scoring`): distance-based score deltas and a tolerance filter
//! - **Convergence** (`convergence`): guess / continue / give-up policy
//! - **Sessions** (`session`): per-session locking in a concurrent table
//! - **Learning** (`learning`): effectiveness EMA and attribute reinforcement
//! - **Storage** (`store`): in-memory (DashMap) or durable (redb) catalogue
//!
//! ## Library usage
//!
//! ```no_run
//! use twenty_q::engine::{AnswerOutcome, GameEngine};
//! use twenty_q::config::EngineConfig;
//! use twenty_q::model::Answer;
//!
//! let engine = GameEngine::new(EngineConfig::default()).unwrap();
//! let start = engine.start().unwrap();
//! match engine.answer(&start.session_id, start.question.id, Answer::Yes).unwrap() {
//!     AnswerOutcome::Question { question, .. } => println!("{}", question.text),
//!     AnswerOutcome::Guess { entity, .. } => println!("Is it {}?", entity.name),
//!     AnswerOutcome::GiveUp { message, .. } => println!("{message}"),
//! }
//! ```

pub mod config;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod learning;
pub mod model;
pub mod paths;
pub mod scoring;
pub mod select;
pub mod session;
pub mod store;
