//! Verification gateway - one-time code check between an HTTP redirect and a
//! local worker.
//!
//! A caller arrives with either an OAuth `state` + `code` pair or an emailed
//! `user` + `code` pair. The gateway shape-checks the pair, confirms it
//! against the relational store, hands the result to the worker over a raw
//! TCP socket and answers with one fixed plain-text message.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                       VERIFICATION GATEWAY                         │
//! ├────────────────────────────────────────────────────────────────────┤
//! │   GET /verify          GET /health          GET /metrics           │
//! │        │                                                           │
//! │  ┌─────┴──────────────────────────────────┐                        │
//! │  │ Middleware: Tracing → IpProtection →   │                        │
//! │  │             Timeout                    │                        │
//! │  └─────┬──────────────────────────────────┘                        │
//! │        │ audit event ──────────────────────────→ AuditSink          │
//! │  ┌─────┴──────────────────────────────────┐        (webhook)       │
//! │  │ Controller (type-state)                │                        │
//! │  │ validate → check_store → notify        │                        │
//! │  └─────┬─────────────────┬────────────────┘                        │
//! └────────┼─────────────────┼─────────────────────────────────────────┘
//!          ▼                 ▼
//!   VerificationStore   DownstreamNotifier
//!      (MySQL)          (TCP 127.0.0.1:8888)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use verify_gateway::{GatewayConfig, VerificationGatewayService};
//!
//! let config = GatewayConfig::load("gateway.json")?;
//! let store = Arc::new(MySqlVerificationStore::connect_lazy(&config.store));
//! let notifier = Arc::new(TcpNotifier::new(&config.downstream));
//! let service = VerificationGatewayService::new(config, store, notifier, Arc::new(NoopAuditSink))?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod controller;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::{InMemoryVerificationStore, MySqlVerificationStore, TcpNotifier, WebhookAuditSink};
pub use controller::GatewayController;
pub use domain::config::GatewayConfig;
pub use domain::error::{GatewayError, NotifyError, StoreError, ValidationError};
pub use domain::types::*;
pub use middleware::GatewayMetrics;
pub use ports::{AuditSink, DownstreamNotifier, NoopAuditSink, VerificationStore};
pub use service::VerificationGatewayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
