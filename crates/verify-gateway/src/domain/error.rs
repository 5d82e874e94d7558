//! Error types for each verification stage.
//!
//! Every stage returns its own error. The controller logs the detail and
//! collapses it into a [`GatewayOutcome`]; nothing here reaches the caller.

use std::io;
use std::time::Duration;

use super::types::{Flow, GatewayOutcome};

/// Input rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required query parameter absent or empty
    #[error("missing parameter: {0}")]
    Missing(&'static str),

    /// Parameter exceeds the hard length cap
    #[error("parameter {field} too long: {len} bytes")]
    TooLong { field: &'static str, len: usize },

    /// Parameter does not match its pattern
    #[error("malformed parameter: {0}")]
    Malformed(&'static str),

    /// Parameter given more than once
    #[error("duplicate parameter: {0}")]
    Duplicate(&'static str),

    /// Both `state` and `user` present, or the query string is not decodable
    #[error("ambiguous or undecodable query")]
    Ambiguous,

    /// The flow this request belongs to is switched off
    #[error("flow disabled: {0}")]
    FlowDisabled(Flow),
}

impl ValidationError {
    pub fn outcome(&self) -> GatewayOutcome {
        GatewayOutcome::InvalidRequest
    }
}

/// Store round trip failed. A missing row is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection (unreachable, auth failure, pool exhausted)
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Statement failed on an established connection
    #[error("store query failed: {0}")]
    Query(String),

    /// Statement did not finish in time
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn outcome(&self) -> GatewayOutcome {
        GatewayOutcome::StoreUnavailable
    }
}

/// Hand-off to the downstream worker failed.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Worker closed the connection without acknowledging
    #[error("downstream closed without reply")]
    EmptyReply,

    /// Worker answered with the rejection byte
    #[error("downstream declined verification")]
    Rejected,

    /// Record data cannot be encoded in the wire format
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl NotifyError {
    pub fn outcome(&self) -> GatewayOutcome {
        GatewayOutcome::NotifyFailed
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NotifyError::ConnectTimeout(_) | NotifyError::WriteTimeout(_) | NotifyError::ReadTimeout(_)
        )
    }
}

/// Gateway-level errors (startup and serving, not per request)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// HTTP server stopped with an error
    #[error("server error: {0}")]
    Serve(String),
}
