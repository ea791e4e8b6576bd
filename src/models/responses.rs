use serde::{Deserialize, Serialize};

/// Response for the events endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAccepted {
    pub accepted: bool,
    pub effects: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
