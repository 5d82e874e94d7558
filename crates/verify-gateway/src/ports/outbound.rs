//! Outbound (driven) ports for the verification gateway.
//!
//! These traits define the gateway's dependencies on the relational store,
//! the downstream worker and the audit channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuditEvent, AuthCode, MatchedRecord, NotificationPayload, NotifyError, SessionToken,
    StoreError, UserId,
};

/// Access to the verification records.
///
/// Implementations must issue exactly one statement per call and must not
/// retry. A record that does not exist or is not eligible is `Ok`, not an
/// error.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Update mode: set the code on a session record that has none yet.
    ///
    /// # Returns
    /// - `Ok(n)`: number of records that transitioned (0 if unknown or already consumed)
    /// - `Err`: the store could not be reached or the statement failed
    async fn mark_code_received(
        &self,
        state: &SessionToken,
        code: &AuthCode,
    ) -> Result<u64, StoreError>;

    /// Lookup mode: fetch the user record matching `code` inside the
    /// freshness window.
    async fn find_fresh_record(
        &self,
        user: &UserId,
        code: &AuthCode,
    ) -> Result<Option<MatchedRecord>, StoreError>;
}

/// Hand-off channel to the downstream worker.
#[async_trait]
pub trait DownstreamNotifier: Send + Sync {
    /// Deliver one payload. With `await_ack` the worker's reply byte decides
    /// success; without it a completed write is success.
    async fn notify(&self, payload: &NotificationPayload, await_ack: bool)
        -> Result<(), NotifyError>;
}

/// Destination for per-request audit events.
///
/// `record` must return immediately; delivery happens in the background and
/// can never fail the request.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::trace!(request_id = %event.request_id, "Audit disabled, event dropped");
    }
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
