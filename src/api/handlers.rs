//! HTTP request handlers

use super::types::{
    ErrorResponse, GatewayRequest, SimulateRequest, SimulateResponse, StatusResponse,
};
use super::AppState;
use crate::dialogue::{Reply, UssdRequest};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Telecom gateway callback
        .route("/ussd", post(ussd_callback))
        // Browser and test harness
        .route("/api/ussd/simulate", post(simulate))
        .route("/api/ussd/status", get(status))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Gateway
// ============================================================

/// Answer with the `CON `/`END ` text the gateway relays to the handset
async fn ussd_callback(
    State(state): State<AppState>,
    Form(req): Form<GatewayRequest>,
) -> Response {
    if req.session_id.trim().is_empty() || req.phone_number.trim().is_empty() {
        tracing::warn!("Gateway callback without sessionId or phoneNumber");
        let reply = Reply::end("Invalid request.");
        return (StatusCode::BAD_REQUEST, reply.to_gateway()).into_response();
    }

    let reply = state
        .engine
        .handle(&UssdRequest {
            session_id: req.session_id,
            phone_number: req.phone_number,
            text: req.text,
            service_code: req.service_code,
        })
        .await;
    reply.to_gateway().into_response()
}

// ============================================================
// Simulator
// ============================================================

async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, AppError> {
    if req.session_id.trim().is_empty() {
        return Err(AppError::BadRequest("sessionId is required".to_string()));
    }
    if req.phone_number.trim().is_empty() {
        return Err(AppError::BadRequest("phoneNumber is required".to_string()));
    }

    let reply = state
        .engine
        .handle(&UssdRequest {
            session_id: req.session_id,
            phone_number: req.phone_number,
            text: req.text,
            service_code: req.service_code,
        })
        .await;

    Ok(Json(SimulateResponse {
        response: reply.text,
        should_end_session: reply.end,
    }))
}

// ============================================================
// Status
// ============================================================

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let active_session_count = state
        .engine
        .active_sessions()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(StatusResponse {
        active_session_count,
        uptime: state.started_at.elapsed().as_secs(),
        timeout_label: state.timeout_label.clone(),
    }))
}

async fn get_version() -> &'static str {
    concat!("ussd-dialogue ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
