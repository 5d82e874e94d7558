//! End-to-end flows through the router, the in-memory store and a real TCP
//! worker on an ephemeral port.

pub mod flows;
pub mod support;
