//! # Verification Gateway Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs   # Fake downstream worker, service builders
//!     └── flows.rs     # End-to-end request flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p verify-gateway-tests
//! ```

pub mod integration;
