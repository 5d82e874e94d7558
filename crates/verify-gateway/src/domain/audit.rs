//! Audit record emitted for every verification request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;

use super::correlation::RequestId;

/// Longest header value copied into an audit event
const MAX_HEADER_LEN: usize = 512;

/// Who called the verification endpoint, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub request_id: RequestId,
    pub client_ip: IpAddr,
    /// Full request URI including the query string
    pub uri: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: RequestId,
        client_ip: IpAddr,
        uri: impl Into<String>,
        referrer: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        Self {
            request_id,
            client_ip,
            uri: truncate(uri.into()),
            referrer: referrer.map(|r| truncate(r.to_string())),
            user_agent: user_agent.map(|u| truncate(u.to_string())),
            received_at: Utc::now(),
        }
    }
}

fn truncate(mut value: String) -> String {
    if value.len() > MAX_HEADER_LEN {
        let mut cut = MAX_HEADER_LEN;
        while !value.is_char_boundary(cut) {
            cut -= 1;
        }
        value.truncate(cut);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_long_headers_truncated_on_char_boundary() {
        let agent = "é".repeat(MAX_HEADER_LEN);
        let event = AuditEvent::new(
            RequestId::new(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "/verify?state=x",
            None,
            Some(&agent),
        );
        let stored = event.user_agent.unwrap();
        assert!(stored.len() <= MAX_HEADER_LEN);
        assert!(stored.chars().all(|c| c == 'é'));
        assert_eq!(event.uri, "/verify?state=x");
        assert!(event.referrer.is_none());
    }
}
