use super::state::AppState;
use crate::avatar::PoseState;
use crate::avatar::motion::{BreathingConfig, BreathingUpdate};
use crate::nats::utterance;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub message: String,

    /// Optional correlation id (if not provided, generate UUID)
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UtteranceResponse {
    pub id: String,
    pub pose: PoseState,
}

#[derive(Debug, Serialize)]
pub struct PoseResponse {
    pub pose: PoseState,
}

#[derive(Debug, Serialize)]
pub struct BreathingResponse {
    pub breathing: BreathingConfig,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /avatar/status
/// Pose, playback and aggregation snapshot
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.lock().await;
    (StatusCode::OK, Json(runtime.status()))
}

/// POST /avatar/attention
pub async fn notify_attention(State(state): State<AppState>) -> impl IntoResponse {
    let mut runtime = state.runtime.lock().await;
    runtime.notify_attention();
    Json(PoseResponse {
        pose: runtime.pose_state(),
    })
}

/// POST /avatar/thinking
pub async fn notify_thinking(State(state): State<AppState>) -> impl IntoResponse {
    let mut runtime = state.runtime.lock().await;
    runtime.notify_thinking();
    Json(PoseResponse {
        pose: runtime.pose_state(),
    })
}

/// POST /avatar/idle
/// Ends the current performance, if any
pub async fn notify_idle(State(state): State<AppState>) -> impl IntoResponse {
    let mut runtime = state.runtime.lock().await;
    runtime.notify_idle();
    Json(PoseResponse {
        pose: runtime.pose_state(),
    })
}

/// POST /avatar/breathing
/// Partial breathing update; omitted fields keep their value
pub async fn set_breathing(
    State(state): State<AppState>,
    Json(update): Json<BreathingUpdate>,
) -> impl IntoResponse {
    if update.duration_secs.is_some_and(|d| d <= 0.0) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "duration_secs must be positive".to_string(),
        );
    }

    let mut runtime = state.runtime.lock().await;
    runtime.set_breathing_config(&update);
    (
        StatusCode::OK,
        Json(BreathingResponse {
            breathing: runtime.status().breathing,
        }),
    )
        .into_response()
}

/// POST /avatar/utterance
/// Send the user's message to the reply service and start thinking
pub async fn send_utterance(
    State(state): State<AppState>,
    Json(req): Json<UtteranceRequest>,
) -> impl IntoResponse {
    if req.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is empty".to_string());
    }

    let Some(sink) = state.sink.clone() else {
        warn!("Utterance received but reply service is not connected");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Reply service not connected".to_string(),
        );
    };

    let message = utterance(&req.message, req.id);
    if let Err(e) = sink.send_utterance(&message).await {
        error!("Failed to send utterance {}: {:#}", message.id, e);
        return error_response(
            StatusCode::BAD_GATEWAY,
            format!("Failed to send utterance: {}", e),
        );
    }

    info!("Utterance {} sent", message.id);

    let mut runtime = state.runtime.lock().await;
    runtime.notify_thinking();
    (
        StatusCode::OK,
        Json(UtteranceResponse {
            id: message.id,
            pose: runtime.pose_state(),
        }),
    )
        .into_response()
}

/// POST /avatar/inbound
/// Inject a raw reply-service payload, as if it arrived over the transport
pub async fn inject_inbound(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let mut runtime = state.runtime.lock().await;
    runtime.ingest_raw(&body);
    (StatusCode::ACCEPTED, Json(runtime.status()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
