//! Adapters implementing the outbound ports.

pub mod memory_store;
pub mod mysql_store;
pub mod tcp_notifier;
pub mod webhook_audit;

pub use memory_store::InMemoryVerificationStore;
pub use mysql_store::MySqlVerificationStore;
pub use tcp_notifier::{TcpNotifier, REJECTION_BYTE};
pub use webhook_audit::{WebhookAuditSink, WebhookError};
