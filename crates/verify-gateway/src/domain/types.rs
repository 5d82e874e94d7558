//! Core types for the verification flow.
//!
//! Identifier newtypes can only be built by the validator, so anything that
//! reaches the store or the notifier has already passed its shape check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::NotifyError;

/// Separator between user id and email in the downstream payload.
pub const PAYLOAD_SEPARATOR: char = ':';

/// A configured verification flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// `state` + `code` from the OAuth redirect, update mode.
    Session,
    /// `user` + `code` from the emailed one-click link, lookup mode.
    User,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Session => "session",
            Flow::User => "user",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted input shapes.
///
/// | Shape | primary | code |
/// |-------|---------|------|
/// | `SessionCode` | 16 word chars | `[a-zA-Z0-9._-]+` |
/// | `StrictSessionCode` | 16 word chars | 16 word chars |
/// | `UserCode` | 7-20 digits | 16 word chars |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowShape {
    SessionCode,
    StrictSessionCode,
    UserCode,
}

impl FlowShape {
    pub fn flow(&self) -> Flow {
        match self {
            FlowShape::SessionCode | FlowShape::StrictSessionCode => Flow::Session,
            FlowShape::UserCode => Flow::User,
        }
    }
}

/// OAuth `state` value: exactly 16 ASCII word characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

/// Authorization code supplied alongside the primary identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthCode(String);

/// Numeric user identifier, 7 to 20 digits. Kept as text since 20 digits
/// overflow `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

macro_rules! identifier_impls {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                pub(crate) fn new_unchecked(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

identifier_impls!(SessionToken, AuthCode, UserId);

/// A validated verification request. Lives for one HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationRequest {
    Session { state: SessionToken, code: AuthCode },
    User { user: UserId, code: AuthCode },
}

impl VerificationRequest {
    pub fn flow(&self) -> Flow {
        match self {
            VerificationRequest::Session { .. } => Flow::Session,
            VerificationRequest::User { .. } => Flow::User,
        }
    }

    /// The primary identifier, used for logging and reconciliation.
    pub fn primary_id(&self) -> &str {
        match self {
            VerificationRequest::Session { state, .. } => state.as_str(),
            VerificationRequest::User { user, .. } => user.as_str(),
        }
    }
}

/// A verification record as held by the store.
///
/// The gateway never creates or deletes these; it only sets `code` (update
/// mode) or reads a fresh row (lookup mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// `state` for session records, user id for user records.
    pub key: String,
    /// Authorization code. Unset until the redirect arrives (session) or the
    /// emailed one-click code (user).
    pub code: Option<String>,
    /// Email the code was sent to. Only user records carry one.
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row returned by a lookup-mode query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRecord {
    pub user_id: String,
    pub email: String,
}

/// Bytes handed to the downstream worker.
///
/// There is no framing: the worker reads until it has the payload. Either the
/// bare session token, or `userId:email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    Token(SessionToken),
    UserEmail { user_id: String, email: String },
}

impl NotificationPayload {
    /// Build a `userId:email` payload from a matched record.
    ///
    /// The worker splits on the separator and expects exactly two parts, so
    /// an empty email or one containing the separator is refused here.
    pub fn from_record(record: MatchedRecord) -> Result<Self, NotifyError> {
        if record.email.is_empty() || record.email.contains(PAYLOAD_SEPARATOR) {
            return Err(NotifyError::MalformedPayload(format!(
                "email for user {} cannot be framed",
                record.user_id
            )));
        }
        Ok(NotificationPayload::UserEmail {
            user_id: record.user_id,
            email: record.email,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            NotificationPayload::Token(token) => token.as_str().as_bytes().to_vec(),
            NotificationPayload::UserEmail { user_id, email } => {
                format!("{}{}{}", user_id, PAYLOAD_SEPARATOR, email).into_bytes()
            }
        }
    }
}

/// Final result of one verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    InvalidRequest,
    StoreUnavailable,
    RecordNotFoundOrExpired,
    NotifyFailed,
    Verified,
}

impl GatewayOutcome {
    pub const ALL: [GatewayOutcome; 5] = [
        GatewayOutcome::InvalidRequest,
        GatewayOutcome::StoreUnavailable,
        GatewayOutcome::RecordNotFoundOrExpired,
        GatewayOutcome::NotifyFailed,
        GatewayOutcome::Verified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOutcome::InvalidRequest => "invalid_request",
            GatewayOutcome::StoreUnavailable => "store_unavailable",
            GatewayOutcome::RecordNotFoundOrExpired => "record_not_found_or_expired",
            GatewayOutcome::NotifyFailed => "notify_failed",
            GatewayOutcome::Verified => "verified",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GatewayOutcome::Verified)
    }
}

impl fmt::Display for GatewayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_payload_is_bare_token() {
        let payload = NotificationPayload::Token(SessionToken::new_unchecked("abcd1234abcd1234"));
        assert_eq!(payload.to_bytes(), b"abcd1234abcd1234".to_vec());
    }

    #[test]
    fn test_user_payload_joined_by_colon() {
        let payload = NotificationPayload::from_record(MatchedRecord {
            user_id: "12345678".into(),
            email: "jane.doe@trojans.dsu.edu".into(),
        })
        .unwrap();
        assert_eq!(payload.to_bytes(), b"12345678:jane.doe@trojans.dsu.edu".to_vec());
    }

    #[test]
    fn test_user_payload_rejects_unframeable_email() {
        let err = NotificationPayload::from_record(MatchedRecord {
            user_id: "12345678".into(),
            email: "a:b@dsu.edu".into(),
        })
        .unwrap_err();
        assert!(matches!(err, NotifyError::MalformedPayload(_)));

        assert!(NotificationPayload::from_record(MatchedRecord {
            user_id: "12345678".into(),
            email: String::new(),
        })
        .is_err());
    }

    #[test]
    fn test_request_flow_and_primary_id() {
        let request = VerificationRequest::User {
            user: UserId::new_unchecked("12345678"),
            code: AuthCode::new_unchecked("abcd1234abcd1234"),
        };
        assert_eq!(request.flow(), Flow::User);
        assert_eq!(request.primary_id(), "12345678");
        assert_eq!(FlowShape::StrictSessionCode.flow(), Flow::Session);
    }

    #[test]
    fn test_outcome_names_unique() {
        let names: std::collections::HashSet<_> =
            GatewayOutcome::ALL.iter().map(|o| o.as_str()).collect();
        assert_eq!(names.len(), GatewayOutcome::ALL.len());
        assert!(GatewayOutcome::Verified.is_success());
        assert!(!GatewayOutcome::NotifyFailed.is_success());
    }
}
