use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::codec::{self, PreviewStore};
use crate::config::Config;
use crate::error::CodecError;
use crate::gemini::AnalysisClient;
use crate::session::{ensure_session, SessionId};
use crate::state::AnalysisStateMachine;
use crate::views;

/// Shared by all handlers. Each browser session owns its own machine.
pub struct AppState {
    // TODO: evict machines of sessions that have been idle for a while.
    pub sessions: Mutex<HashMap<SessionId, AnalysisStateMachine>>,
    pub client: AnalysisClient,
    pub previews: PreviewStore,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            client: AnalysisClient::new(config),
            previews: PreviewStore::new(),
        }
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/image", post(select_image))
        .route("/clear", post(clear_image))
        .route("/analyze", post(analyze))
        .route("/preview/:id", get(preview))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(ensure_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Html<String> {
    let sessions = state.sessions.lock().await;
    match sessions.get(&session) {
        Some(machine) => Html(views::render_page(machine)),
        None => Html(views::render_page(&AnalysisStateMachine::new())),
    }
}

async fn select_image(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    mut multipart: Multipart,
) -> Redirect {
    let upload = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("image") => {
                break codec::read_upload(field, &state.previews).await;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break Ok(None),
            Err(e) => break Err(CodecError::Read(e.body_text())),
        }
    };

    let mut sessions = state.sessions.lock().await;
    let machine = sessions.entry(session).or_default();
    match upload {
        Ok(Some(image)) => machine.select_image(image),
        Ok(None) => tracing::debug!("upload submitted without a file"),
        Err(error) => machine.read_failed(&error),
    }
    Redirect::to("/")
}

async fn clear_image(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Redirect {
    if let Some(machine) = state.sessions.lock().await.get_mut(&session) {
        machine.clear();
    }
    Redirect::to("/")
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Redirect {
    let begun = state
        .sessions
        .lock()
        .await
        .entry(session)
        .or_default()
        .begin_analysis();
    let ticket = match begun {
        Ok(Some(ticket)) => ticket,
        Ok(None) => {
            tracing::debug!("analysis already in flight");
            return Redirect::to("/");
        }
        Err(error) => {
            tracing::info!(%error, "analyze requested without an image");
            return Redirect::to("/");
        }
    };

    let state = Arc::clone(&state);
    tokio::spawn(async move {
        let result = state
            .client
            .analyze(&ticket.payload, &ticket.media_type)
            .await;
        match state.sessions.lock().await.get_mut(&session) {
            Some(machine) => {
                machine.complete(ticket.generation, result);
            }
            None => tracing::warn!(%session, "session gone before analysis finished"),
        }
    });

    Redirect::to("/")
}

/// Serves a preview only to the session whose image it belongs to.
async fn preview(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(id): Path<u64>,
) -> Response {
    let owned = state
        .sessions
        .lock()
        .await
        .get(&session)
        .and_then(|machine| machine.state().image())
        .is_some_and(|image| image.preview.id() == id);
    if !owned {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.previews.get(id) {
        Some(preview) => (
            [
                (header::CONTENT_TYPE, preview.media_type),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            preview.bytes,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
