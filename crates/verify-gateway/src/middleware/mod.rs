//! Middleware stack for the verification endpoint.
//!
//! Layer order: Request → Tracing → IpProtection → Timeout → Handler
//!
//! Tracing is outermost so a timed-out request still carries its request ID
//! and status on the span.

pub mod ip_protection;
pub mod metrics;
pub mod timeout;
pub mod tracing;

pub use ip_protection::{ClientIp, IpProtectionLayer};
pub use metrics::{GatewayMetrics, MetricsSnapshot, RequestTimer};
pub use timeout::TimeoutLayer;
pub use self::tracing::TracingLayer;
