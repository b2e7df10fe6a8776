//! twenty-q HTTP server.
//!
//! **Game:**
//! - `POST /api/game/start`: start a game, returns the first question
//! - `POST /api/game/answer`: answer a question, returns the next question, a guess, or a give-up
//! - `POST /api/game/confirm`: confirm or reject a guess
//! - `POST /api/game/abandon`: discard a live game
//!
//! **Catalogue:**
//! - `GET  /api/stats`: learning statistics
//! - `GET  /api/questions`: question catalogue
//! - `GET  /api/entities`: entity catalogue
//! - `POST /api/entities`: add an entity the engine failed to guess
//!
//! **Health:**
//! - `GET  /health`: server status
//!
//! Build and run: `cargo run --features server --bin twenty-q-server`

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use twenty_q::config::EngineConfig;
use twenty_q::engine::{AnswerOutcome, ConfirmOutcome, GameEngine, StartOutcome};
use twenty_q::error::{GameError, TqError};
use twenty_q::learning::LearningStats;
use twenty_q::model::{
    Answer, AttributeValue, EntityId, EntityMeta, NewEntity, Question, QuestionId, SessionId,
};
use twenty_q::paths::TqPaths;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

// ── Server state ──────────────────────────────────────────────────────────

struct ServerState {
    engine: GameEngine,
}

fn status_for(err: &TqError) -> StatusCode {
    match err {
        TqError::Game(GameError::SessionNotFound { .. } | GameError::QuestionNotFound { .. }) => {
            StatusCode::NOT_FOUND
        }
        TqError::Game(GameError::SessionBusy { .. }) => StatusCode::CONFLICT,
        TqError::Game(GameError::NoQuestionsAvailable) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: TqError) -> (StatusCode, String) {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct AnswerRequest {
    session_id: SessionId,
    question_id: QuestionId,
    answer: Answer,
}

#[derive(Deserialize)]
struct ConfirmRequest {
    session_id: SessionId,
    entity_id: EntityId,
    correct: bool,
}

#[derive(Deserialize)]
struct SessionRequest {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct AddEntityRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    /// Attribute key → value in -2..=2, usually the answers of the lost game.
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Serialize)]
struct AddEntityResponse {
    entity_id: EntityId,
    created: bool,
}

#[derive(Serialize)]
struct AbandonResponse {
    session_id: SessionId,
    abandoned: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    live_sessions: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        live_sessions: state.engine.live_sessions(),
    })
}

async fn start_game(State(state): State<Arc<ServerState>>) -> ApiResult<StartOutcome> {
    state.engine.start().map(Json).map_err(api_error)
}

async fn answer(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<AnswerOutcome> {
    state
        .engine
        .answer(&req.session_id, req.question_id, req.answer)
        .map(Json)
        .map_err(api_error)
}

async fn confirm(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<ConfirmOutcome> {
    state
        .engine
        .confirm(&req.session_id, req.entity_id, req.correct)
        .map(Json)
        .map_err(api_error)
}

async fn abandon(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SessionRequest>,
) -> ApiResult<AbandonResponse> {
    state.engine.abandon(&req.session_id).map_err(api_error)?;
    Ok(Json(AbandonResponse {
        session_id: req.session_id,
        abandoned: true,
    }))
}

async fn stats(State(state): State<Arc<ServerState>>) -> ApiResult<LearningStats> {
    state.engine.stats().map(Json).map_err(api_error)
}

async fn questions(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<Question>> {
    state
        .engine
        .store()
        .questions()
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

async fn entities(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<EntityMeta>> {
    state
        .engine
        .store()
        .entities()
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

async fn add_entity(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AddEntityRequest>,
) -> ApiResult<AddEntityResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "entity name must not be empty".to_string()));
    }
    let mut entity = NewEntity::named(name).with_answers(&req.attributes);
    entity.description = req.description;
    entity.image_url = req.image_url;
    let (entity_id, created) = state.engine.add_entity(entity).map_err(api_error)?;
    Ok(Json(AddEntityResponse { entity_id, created }))
}

// ── Main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("TQ_SERVER_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("TQ_SERVER_PORT").unwrap_or_else(|_| "8300".to_string());
    let addr = format!("{bind}:{port}");

    let paths = TqPaths::resolve().unwrap_or_else(|e| {
        tracing::error!("failed to resolve XDG paths: {e}");
        std::process::exit(1);
    });
    if let Err(e) = paths.ensure_dirs() {
        tracing::error!("failed to create XDG directories: {e}");
        std::process::exit(1);
    }

    let config_path = std::env::var("TQ_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| paths.config_file());
    let mut config = EngineConfig::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!("failed to load config {}: {e}", config_path.display());
        std::process::exit(1);
    });
    if config.data_dir.is_none() {
        config.data_dir = Some(paths.data_dir.clone());
    }
    let reap_interval = config.sessions.reap_interval();

    let engine = GameEngine::new(config).unwrap_or_else(|e| {
        tracing::error!("failed to open engine: {e}");
        std::process::exit(1);
    });
    let state = Arc::new(ServerState { engine });

    let reaper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_interval);
        loop {
            ticker.tick().await;
            reaper.engine.reap_idle_sessions();
        }
    });

    let app = Router::new()
        // Health.
        .route("/health", get(health))
        // Game.
        .route("/api/game/start", post(start_game))
        .route("/api/game/answer", post(answer))
        .route("/api/game/confirm", post(confirm))
        .route("/api/game/abandon", post(abandon))
        // Catalogue.
        .route("/api/stats", get(stats))
        .route("/api/questions", get(questions))
        .route("/api/entities", get(entities).post(add_entity))
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("twenty-q server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
