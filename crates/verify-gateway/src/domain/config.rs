//! Gateway configuration with validation.
//!
//! Loaded once at startup from a JSON file, then environment overrides, then
//! validated. Immutable afterwards and passed explicitly to each component.
//!
//! ```json
//! {
//!   "http": { "port": 8080, "path": "/verify" },
//!   "store": { "host": "localhost", "user": "gateway", "password": "...", "database": "discord" },
//!   "downstream": { "port": 8888, "read_timeout": "3s" },
//!   "flows": { "session": { "strict_code": false, "await_ack": true } },
//!   "audit": { "webhook_url": "https://discord.com/api/webhooks/..." }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use super::types::Flow;

/// Config file used when neither `--config` nor `VG_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "gateway.json";

/// Paths served by the gateway itself; the verification path may not shadow them
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Relational store connection (required)
    #[serde(alias = "db")]
    pub store: StoreConfig,
    /// Downstream worker socket
    #[serde(default)]
    pub downstream: DownstreamConfig,
    /// Per-flow switches
    #[serde(default)]
    pub flows: FlowsConfig,
    /// Audit webhook
    #[serde(default)]
    pub audit: AuditConfig,
    /// Request-level timeout
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Client IP resolution
    #[serde(default)]
    pub security: SecurityConfig,
}

impl GatewayConfig {
    /// Build a config with defaults everywhere except the store.
    pub fn with_store(store: StoreConfig) -> Self {
        Self {
            http: HttpConfig::default(),
            store,
            downstream: DownstreamConfig::default(),
            flows: FlowsConfig::default(),
            audit: AuditConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
        }
    }

    /// Load from file, apply `VG_*` environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file without overrides or validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production). A present but unparsable value is an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VG_HTTP_PORT") {
            self.http.port = parse_override("VG_HTTP_PORT", &value)?;
        }
        if let Some(value) = lookup("VG_STORE_HOST") {
            self.store.host = value;
        }
        if let Some(value) = lookup("VG_STORE_PASSWORD") {
            self.store.password = value;
        }
        if let Some(value) = lookup("VG_DOWNSTREAM_PORT") {
            self.downstream.port = parse_override("VG_DOWNSTREAM_PORT", &value)?;
        }
        if let Some(value) = lookup("VG_AUDIT_WEBHOOK") {
            self.audit.webhook_url = if value.is_empty() { None } else { Some(value) };
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::InvalidPort("http.port"));
        }
        if self.store.port == 0 {
            return Err(ConfigError::InvalidPort("store.port"));
        }
        if self.downstream.port == 0 {
            return Err(ConfigError::InvalidPort("downstream.port"));
        }

        if !self.http.path.starts_with('/') || self.http.path.len() < 2 {
            return Err(ConfigError::InvalidPath(self.http.path.clone()));
        }
        if RESERVED_PATHS.contains(&self.http.path.as_str()) {
            return Err(ConfigError::InvalidPath(self.http.path.clone()));
        }

        for (field, value) in [
            ("store.host", &self.store.host),
            ("store.user", &self.store.user),
            ("store.database", &self.store.database),
            ("downstream.host", &self.downstream.host),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.max_connections cannot be 0".into(),
            ));
        }

        for (field, value) in [
            ("store.acquire_timeout", self.store.acquire_timeout),
            ("store.query_timeout", self.store.query_timeout),
            ("store.freshness_window", self.store.freshness_window),
            ("downstream.connect_timeout", self.downstream.connect_timeout),
            ("downstream.write_timeout", self.downstream.write_timeout),
            ("downstream.read_timeout", self.downstream.read_timeout),
            ("audit.timeout", self.audit.timeout),
            ("timeouts.request", self.timeouts.request),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{} cannot be 0", field)));
            }
        }

        // A hand-off failing after the update must still report NotifyFailed.
        let budget = self.stage_budget();
        if self.timeouts.request <= budget {
            return Err(ConfigError::InvalidTimeout(format!(
                "timeouts.request ({:?}) must exceed the sum of store and downstream timeouts ({:?})",
                self.timeouts.request, budget
            )));
        }

        if !self.flows.session.enabled && !self.flows.user.enabled {
            return Err(ConfigError::NoFlowsEnabled);
        }

        if let Some(url) = &self.audit.webhook_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::Invalid(
                    "audit.webhook_url must be an http(s) URL".into(),
                ));
            }
        }

        Ok(())
    }

    /// Worst case time spent in the store and downstream stages of one request.
    pub fn stage_budget(&self) -> Duration {
        [
            self.store.query_timeout,
            self.downstream.connect_timeout,
            self.downstream.write_timeout,
            self.downstream.read_timeout,
        ]
        .into_iter()
        .fold(self.store.acquire_timeout, Duration::saturating_add)
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

fn parse_override<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        var,
        value: value.to_string(),
    })
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
    /// Path of the verification endpoint
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            path: "/verify".to_string(),
        }
    }
}

/// Relational store configuration.
///
/// Credentials have no defaults; a config without them fails to parse.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(alias = "db")]
    pub database: String,
    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Bound on obtaining a connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Bound on one statement round trip
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
    /// Lookup mode only accepts records younger than this
    #[serde(default = "default_freshness_window", with = "humantime_serde")]
    pub freshness_window: Duration,
}

impl StoreConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_store_port(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            query_timeout: default_query_timeout(),
            freshness_window: default_freshness_window(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("freshness_window", &self.freshness_window)
            .finish()
    }
}

fn default_store_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_freshness_window() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Downstream worker socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub host: String,
    /// Port (default: 8888)
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            connect_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(3),
        }
    }
}

/// Per-flow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowsConfig {
    pub session: SessionFlowConfig,
    pub user: UserFlowConfig,
}

impl FlowsConfig {
    /// Whether the notifier waits for the worker's acknowledgement byte
    pub fn awaits_ack(&self, flow: Flow) -> bool {
        match flow {
            Flow::Session => self.session.await_ack,
            Flow::User => self.user.await_ack,
        }
    }
}

/// `state` + `code` flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFlowConfig {
    pub enabled: bool,
    /// Require `code` to be 16 word characters instead of an OAuth token
    pub strict_code: bool,
    pub await_ack: bool,
}

impl Default for SessionFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_code: false,
            await_ack: true,
        }
    }
}

/// `user` + `code` flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserFlowConfig {
    pub enabled: bool,
    pub await_ack: bool,
}

impl Default for UserFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            await_ack: false,
        }
    }
}

/// Audit webhook configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Webhook receiving one message per request; `None` disables auditing
    #[serde(skip_serializing)]
    pub webhook_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on a whole verification request. Must exceed
    /// [`GatewayConfig::stage_budget`].
    #[serde(with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(15),
        }
    }
}

/// Security configuration for client IP resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// List of trusted proxy IPs
    pub trusted_proxies: Vec<IpAddr>,
    /// Trust a reverse proxy on the loopback interface
    pub trust_localhost: bool,
    /// Trust private IPs (10.x, 172.16.x, 192.168.x)
    pub trust_private_ips: bool,
    /// Number of proxies in chain (for X-Forwarded-For parsing)
    pub proxy_count: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            trust_localhost: true,
            trust_private_ips: false,
            proxy_count: 1,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(String),
    #[error("invalid value for {var}: {value:?}")]
    InvalidOverride { var: &'static str, value: String },
    #[error("invalid port: {0}")]
    InvalidPort(&'static str),
    #[error("invalid endpoint path: {0:?}")]
    InvalidPath(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("no verification flow enabled")]
    NoFlowsEnabled,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as `"500ms"`, `"2s"`, `"30m"` or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.trim().parse::<u64>().map_err(|_| "invalid minutes")?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
