use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::arena::{Arena, ArenaSnapshot};
use crate::game::ArenaError;

#[derive(Clone)]
pub struct AppState {
    arena: Arena,
}

impl AppState {
    pub fn new(arena: Arena) -> Self {
        AppState { arena }
    }
}

fn error_response(err: ArenaError) -> Response {
    let status = match err {
        ArenaError::InvalidState(_) => StatusCode::CONFLICT,
        ArenaError::InvalidConfig(_) | ArenaError::InvalidDeck(_) => StatusCode::BAD_REQUEST,
        ArenaError::Transport(_) | ArenaError::Backend(_) | ArenaError::Protocol(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn command_response(result: Result<ArenaSnapshot, ArenaError>) -> Response {
    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

#[axum::debug_handler]
async fn get_state(State(app_state): State<AppState>) -> Response {
    Json(app_state.arena.snapshot()).into_response()
}

#[axum::debug_handler]
async fn get_decks(State(app_state): State<AppState>) -> Response {
    Json(app_state.arena.catalogue()).into_response()
}

#[axum::debug_handler]
async fn start_tournament(State(app_state): State<AppState>) -> Response {
    command_response(app_state.arena.start_tournament())
}

#[axum::debug_handler]
async fn stop_tournament(State(app_state): State<AppState>) -> Response {
    command_response(app_state.arena.stop_tournament())
}

#[axum::debug_handler]
async fn toggle_decks(State(app_state): State<AppState>) -> Response {
    command_response(app_state.arena.toggle_deck_arrangement())
}

/// API routes, plus static assets when a directory is given
pub fn router(arena: Arena, static_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/decks", get(get_decks))
        .route("/api/tournament/start", post(start_tournament))
        .route("/api/tournament/stop", post(stop_tournament))
        .route("/api/decks/toggle", post(toggle_decks));

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(AppState::new(arena))
}

pub async fn run_server(
    arena: Arena,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(arena, static_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("web server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
