//! Domain types for the verification gateway.
//!
//! Configuration, stage errors, the input validator and the response mapper.
//! No I/O happens in this module.

pub mod audit;
pub mod config;
pub mod correlation;
pub mod error;
pub mod response;
pub mod types;
pub mod validator;

pub use audit::AuditEvent;
pub use config::{ConfigError, GatewayConfig, StoreConfig};
pub use correlation::RequestId;
pub use error::{GatewayError, NotifyError, StoreError, ValidationError};
pub use response::map_outcome;
pub use types::*;
pub use validator::{InputValidator, QueryParams};
