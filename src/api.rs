use std::sync::Arc;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{sse::{Event, KeepAlive, Sse}, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

use crate::{catalog::StyleEntry, controller::{Controller, GenerationCycle, Phase, SelectionState}};

#[derive(Clone)]
pub struct AppState {
    ctl: Arc<Controller>,
}

pub fn router(ctl: Arc<Controller>) -> Router {
    Router::new()
        .route("/api/terms", get(get_terms))
        .route("/api/styles", get(get_styles))
        .route("/api/state", get(get_state))
        .route("/api/term", post(select_term))
        .route("/api/style", post(select_style))
        .route("/api/regenerate", post(regenerate))
        .route("/api/image", get(get_image))
        .route("/api/events", get(events))
        .layer(CorsLayer::permissive())
        .with_state(AppState { ctl })
}

pub async fn serve(bind: String, ctl: Arc<Controller>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("jargonviz API listening on http://{bind}");
    axum::serve(listener, router(ctl)).await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateView {
    pub selected_term: Option<String>,
    pub selected_style: String,
    pub phase: String,
    pub has_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data_uri: Option<String>,
}

impl From<SelectionState> for StateView {
    fn from(st: SelectionState) -> Self {
        let (phase, prompt, error) = match &st.phase {
            Phase::Idle => ("idle", None, None),
            Phase::Loading => ("loading", None, None),
            Phase::Ready(img) => ("ready", Some(img.prompt_used.clone()), None),
            Phase::Failed(msg) => ("failed", None, Some(msg.clone())),
        };
        Self {
            has_image: matches!(st.phase, Phase::Ready(_)),
            selected_term: st.selected_term,
            selected_style: st.selected_style,
            phase: phase.to_string(),
            prompt,
            error,
            image_data_uri: None,
        }
    }
}

async fn get_terms(State(st): State<AppState>) -> Json<Vec<String>> {
    Json(st.ctl.catalog().prompts.terms().map(str::to_string).collect())
}

async fn get_styles(State(st): State<AppState>) -> Json<Vec<StyleEntry>> {
    Json(st.ctl.catalog().styles.styles().to_vec())
}

#[derive(Deserialize)]
struct StateQuery {
    #[serde(default)]
    include_image: bool,
}

/// `?include_image=true` inlines the image as a `data:` URI.
async fn get_state(State(st): State<AppState>, Query(q): Query<StateQuery>) -> Json<StateView> {
    let snap = st.ctl.snapshot();
    let data_uri = match (&snap.phase, q.include_image) {
        (Phase::Ready(img), true) => Some(img.data_uri()),
        _ => None,
    };
    let mut view: StateView = snap.into();
    view.image_data_uri = data_uri;
    Json(view)
}

#[derive(Deserialize)]
struct TermReq { term: String }

#[derive(Deserialize)]
struct StyleReq { style: String }

/// Runs the cycle in the background, like a click handler that doesn't
/// await its fetch. Outcomes land in the shared state and the event stream.
fn spawn_cycle(cycle: GenerationCycle) {
    tokio::spawn(async move {
        let _ = cycle.run().await;
    });
}

async fn select_term(State(st): State<AppState>, Json(req): Json<TermReq>) -> Result<impl IntoResponse, ApiErr> {
    if req.term.trim().is_empty() {
        return Err(ApiErr::bad_request("Term is required"));
    }
    let cycle = st.ctl.select_term(&req.term);
    let view: StateView = st.ctl.snapshot().into();
    spawn_cycle(cycle);
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn select_style(State(st): State<AppState>, Json(req): Json<StyleReq>) -> Result<impl IntoResponse, ApiErr> {
    if req.style.trim().is_empty() {
        return Err(ApiErr::bad_request("Style is required"));
    }
    let cycle = st.ctl.select_style(&req.style);
    let view: StateView = st.ctl.snapshot().into();
    match cycle {
        Some(cycle) => {
            spawn_cycle(cycle);
            Ok((StatusCode::ACCEPTED, Json(view)))
        }
        None => Ok((StatusCode::OK, Json(view))),
    }
}

async fn regenerate(State(st): State<AppState>) -> impl IntoResponse {
    let cycle = st.ctl.regenerate();
    let view: StateView = st.ctl.snapshot().into();
    spawn_cycle(cycle);
    (StatusCode::ACCEPTED, Json(view))
}

async fn get_image(State(st): State<AppState>) -> Result<impl IntoResponse, ApiErr> {
    match st.ctl.snapshot().phase {
        Phase::Ready(img) => Ok((StatusCode::OK, [(header::CONTENT_TYPE, img.mime_type)], img.bytes)),
        _ => Err(ApiErr::not_found("No image has been generated yet")),
    }
}

async fn events(
    State(st): State<AppState>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(st.ctl.subscribe())
        .filter_map(|msg| async move { msg.ok() })
        .map(|evt| Event::default().event("message").json_data(evt));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug)]
struct ApiErr {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiErr {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            code: String,
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}
