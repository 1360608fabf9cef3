//! HTTP status API.

use airbuddy_hw::ButtonAction;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::orchestrator::ControllerState;
use crate::scheduler::SchedulerStatus;
use crate::state::AppState;

/// Creates the web router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/readings/latest", get(latest_reading))
        .route("/api/scheduler", get(scheduler_status))
        .route("/api/scheduler/pause", post(scheduler_pause))
        .route("/api/scheduler/resume", post(scheduler_resume))
        .route("/api/button", post(button))
        // Display preview image
        .route("/screen.png", get(screen_png))
        .with_state(state)
}

/// Scheduler and controller state.
#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    scheduler: SchedulerStatus,
    controller: ControllerState,
}

fn status_response(state: &AppState) -> Json<StatusResponse> {
    Json(StatusResponse {
        scheduler: state.scheduler().status(),
        controller: state.orchestrator().state(),
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// GET /api/readings/latest - Last logged reading
async fn latest_reading(State(state): State<Arc<AppState>>) -> Response {
    match state.latest_reading() {
        Some(reading) => Json(reading).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No readings logged yet"),
    }
}

/// GET /api/scheduler - Scheduler status
async fn scheduler_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    status_response(&state)
}

/// POST /api/scheduler/pause - Pause background logging
async fn scheduler_pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler().pause();
    status_response(&state)
}

/// POST /api/scheduler/resume - Resume background logging
async fn scheduler_resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler().resume();
    status_response(&state)
}

/// Virtual button press.
#[derive(Debug, Deserialize)]
struct ButtonRequest {
    action: String,
}

/// POST /api/button - Press the button
async fn button(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ButtonRequest>,
) -> Response {
    let action = match request.action.parse::<ButtonAction>() {
        Ok(action) => action,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    if state.press(action) {
        (
            StatusCode::ACCEPTED,
            Json(json!({ "action": action.to_string() })),
        )
            .into_response()
    } else {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Controller busy")
    }
}

/// GET /screen.png - Last rendered frame as PNG
async fn screen_png(State(state): State<Arc<AppState>>) -> Response {
    match state.screen_png() {
        Some(png_data) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            png_data,
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No rendered screen available"),
    }
}
