//! Rich diagnostic error types for the twenty-q engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly what went wrong
//! and how to recover.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the twenty-q engine.
#[derive(Debug, Error, Diagnostic)]
pub enum TqError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Game errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GameError {
    #[error("session not found: {session_id}")]
    #[diagnostic(
        code(tq::game::session_not_found),
        help(
            "The session id is unknown, or the game already ended (confirmed, \
             abandoned, gave up, or reaped after idling). Start a new game."
        )
    )]
    SessionNotFound { session_id: String },

    #[error("question not found: {question_id}")]
    #[diagnostic(
        code(tq::game::question_not_found),
        help(
            "The question id is not in the catalogue. Answer the question the \
             engine last returned for this session."
        )
    )]
    QuestionNotFound { question_id: u64 },

    #[error("no questions available")]
    #[diagnostic(
        code(tq::game::no_questions),
        help("The question catalogue is empty. Import questions with `twenty-q import`.")
    )]
    NoQuestionsAvailable,

    #[error("session {session_id} is unusable after a failed concurrent update")]
    #[diagnostic(
        code(tq::game::session_busy),
        help("A previous request on this session panicked mid-update. Start a new game.")
    )]
    SessionBusy { session_id: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(tq::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(tq::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption: try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(tq::store::serde),
        help(
            "Failed to serialize or deserialize a stored record. \
             The database was probably written by an incompatible version."
        )
    )]
    Serialization { message: String },

    #[error("key not found: {key}")]
    #[diagnostic(
        code(tq::store::not_found),
        help("The requested record does not exist in the store. Verify the id.")
    )]
    NotFound { key: String },

    #[error("store unavailable: {message}")]
    #[diagnostic(
        code(tq::store::unavailable),
        help("The backing store could not be reached. Retry once it is back.")
    )]
    Unavailable { message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(tq::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(tq::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize config: {message}")]
    #[diagnostic(
        code(tq::config::serialize),
        help("The in-memory config could not be rendered as TOML.")
    )]
    Serialize { message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(tq::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(tq::config::invalid), help("Check the EngineConfig fields. {message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning twenty-q results.
pub type TqResult<T> = std::result::Result<T, TqError>;
