//! Ports (hexagonal architecture boundaries).

pub mod outbound;

pub use outbound::{
    AuditSink, DownstreamNotifier, NoopAuditSink, SystemTimeSource, TimeSource, VerificationStore,
};
