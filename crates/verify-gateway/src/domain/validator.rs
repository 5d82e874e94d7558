//! Input shape validation.
//!
//! First gate of the pipeline: runs before any I/O. Every pattern is anchored,
//! so the whole parameter must match; a valid token followed by anything else
//! is rejected rather than silently truncated.

use regex::Regex;
use std::sync::LazyLock;

use super::config::FlowsConfig;
use super::error::ValidationError;
use super::types::{AuthCode, Flow, FlowShape, SessionToken, UserId, VerificationRequest};

/// Hard cap applied before any regex runs
pub const MAX_PARAM_LEN: usize = 256;

// Explicit ASCII classes: `\w` and `\d` are Unicode-aware in `regex`.
static SESSION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{16}$").expect("static pattern"));
static OAUTH_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static pattern"));
static USER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{7,20}$").expect("static pattern"));

/// The three parameters the gateway looks at. Anything else in the query is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub state: Option<String>,
    pub user: Option<String>,
    pub code: Option<String>,
}

impl QueryParams {
    /// Decode a raw query string. Repeated `state`, `user` or `code` is
    /// rejected instead of picking one occurrence.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(raw).map_err(|_| ValidationError::Ambiguous)?;

        let mut params = Self::default();
        for (key, value) in pairs {
            let (slot, name) = match key.as_str() {
                "state" => (&mut params.state, "state"),
                "user" => (&mut params.user, "user"),
                "code" => (&mut params.code, "code"),
                _ => continue,
            };
            if slot.is_some() {
                return Err(ValidationError::Duplicate(name));
            }
            *slot = Some(value);
        }
        Ok(params)
    }
}

/// Validator configured with the enabled flows and the session code shape.
#[derive(Debug, Clone)]
pub struct InputValidator {
    session_enabled: bool,
    user_enabled: bool,
    strict_session_code: bool,
}

impl InputValidator {
    pub fn new(flows: &FlowsConfig) -> Self {
        Self {
            session_enabled: flows.session.enabled,
            user_enabled: flows.user.enabled,
            strict_session_code: flows.session.strict_code,
        }
    }

    /// Decide which shape the request is in from the parameters present.
    pub fn shape_for(&self, params: &QueryParams) -> Result<FlowShape, ValidationError> {
        let shape = match (&params.state, &params.user) {
            (Some(_), Some(_)) => return Err(ValidationError::Ambiguous),
            (None, Some(_)) => FlowShape::UserCode,
            (Some(_), None) if self.strict_session_code => FlowShape::StrictSessionCode,
            (Some(_), None) => FlowShape::SessionCode,
            (None, None) => return Err(ValidationError::Missing("state")),
        };

        let enabled = match shape.flow() {
            Flow::Session => self.session_enabled,
            Flow::User => self.user_enabled,
        };
        if !enabled {
            return Err(ValidationError::FlowDisabled(shape.flow()));
        }
        Ok(shape)
    }

    /// Extract and shape-check both identifiers.
    pub fn validate(&self, params: &QueryParams) -> Result<VerificationRequest, ValidationError> {
        let shape = self.shape_for(params)?;
        let code_raw = params.code.as_deref();

        match shape {
            FlowShape::SessionCode => Ok(VerificationRequest::Session {
                state: session_token(params.state.as_deref())?,
                code: oauth_code(code_raw)?,
            }),
            FlowShape::StrictSessionCode => Ok(VerificationRequest::Session {
                state: session_token(params.state.as_deref())?,
                code: strict_code(code_raw)?,
            }),
            FlowShape::UserCode => Ok(VerificationRequest::User {
                user: user_id(params.user.as_deref())?,
                code: strict_code(code_raw)?,
            }),
        }
    }
}

fn checked<'a>(
    field: &'static str,
    raw: Option<&'a str>,
    pattern: &Regex,
) -> Result<&'a str, ValidationError> {
    let value = raw
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::Missing(field))?;
    if value.len() > MAX_PARAM_LEN {
        return Err(ValidationError::TooLong {
            field,
            len: value.len(),
        });
    }
    if !pattern.is_match(value) {
        return Err(ValidationError::Malformed(field));
    }
    Ok(value)
}

/// `state`: exactly 16 ASCII word characters
pub fn session_token(raw: Option<&str>) -> Result<SessionToken, ValidationError> {
    checked("state", raw, &SESSION_TOKEN_RE).map(SessionToken::new_unchecked)
}

/// OAuth-style `code`: letters, digits, `.`, `_`, `-`
pub fn oauth_code(raw: Option<&str>) -> Result<AuthCode, ValidationError> {
    checked("code", raw, &OAUTH_CODE_RE).map(AuthCode::new_unchecked)
}

/// Strict `code`: exactly 16 ASCII word characters
pub fn strict_code(raw: Option<&str>) -> Result<AuthCode, ValidationError> {
    checked("code", raw, &SESSION_TOKEN_RE).map(AuthCode::new_unchecked)
}

/// `user`: 7 to 20 ASCII digits
pub fn user_id(raw: Option<&str>) -> Result<UserId, ValidationError> {
    checked("user", raw, &USER_ID_RE).map(UserId::new_unchecked)
}
