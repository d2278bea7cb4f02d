//! Request and response bodies

use serde::{Deserialize, Serialize};

/// Gateway callback, form encoded. Fields the gateway may omit default to
/// empty so a missing one is reported instead of rejected by the extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayRequest {
    pub session_id: String,
    pub phone_number: String,
    pub text: String,
    pub service_code: Option<String>,
}

/// Simulator input, mirrors the gateway fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub session_id: String,
    pub phone_number: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub service_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    /// Reply text without the `CON `/`END ` marker
    pub response: String,
    pub should_end_session: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub active_session_count: usize,
    /// Seconds since the service started
    pub uptime: u64,
    pub timeout_label: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
