//! Outcome to HTTP response mapping.
//!
//! Messages are fixed strings. Internal error text never reaches this layer.

use axum::http::StatusCode;

use super::types::GatewayOutcome;

pub const MSG_INVALID_REQUEST: &str = "Invalid request";
pub const MSG_SERVER_ERROR: &str = "Server error";
pub const MSG_INVALID_OR_EXPIRED: &str = "Invalid or expired code";
pub const MSG_PROCESSING_FAILED: &str = "Could not process request";
pub const MSG_VERIFIED: &str = "Verified";

/// Status and user-facing message for an outcome.
pub fn map_outcome(outcome: GatewayOutcome) -> (StatusCode, &'static str) {
    match outcome {
        GatewayOutcome::InvalidRequest => (StatusCode::BAD_REQUEST, MSG_INVALID_REQUEST),
        GatewayOutcome::StoreUnavailable => (StatusCode::INTERNAL_SERVER_ERROR, MSG_SERVER_ERROR),
        GatewayOutcome::RecordNotFoundOrExpired => {
            (StatusCode::BAD_REQUEST, MSG_INVALID_OR_EXPIRED)
        }
        GatewayOutcome::NotifyFailed => (StatusCode::INTERNAL_SERVER_ERROR, MSG_PROCESSING_FAILED),
        GatewayOutcome::Verified => (StatusCode::OK, MSG_VERIFIED),
    }
}
