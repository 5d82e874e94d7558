//! Verification gateway service - HTTP entry point.
//!
//! Serves `GET {http.path}` plus `/health` and `/metrics` on one listener.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::controller::GatewayController;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::{map_outcome, AuditEvent, RequestId};
use crate::middleware::{
    ClientIp, GatewayMetrics, IpProtectionLayer, RequestTimer, TimeoutLayer, TracingLayer,
};
use crate::ports::{AuditSink, DownstreamNotifier, VerificationStore};

/// Verification gateway service state
pub struct VerificationGatewayService {
    config: Arc<GatewayConfig>,
    controller: GatewayController,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<GatewayMetrics>,
    shutdown: Arc<Notify>,
}

impl VerificationGatewayService {
    /// Create a new gateway service. Fails if the configuration is invalid.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn VerificationStore>,
        notifier: Arc<dyn DownstreamNotifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let controller = GatewayController::new(&config, store, notifier);

        Ok(Self {
            config: Arc::new(config),
            controller,
            audit,
            metrics: Arc::new(GatewayMetrics::new()),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), GatewayError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(addr = %addr, path = %self.config.http.path, "Verification gateway listening");

        let shutdown = Arc::clone(&self.shutdown);
        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await;

        match result {
            Ok(()) => {
                info!("Verification gateway stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "HTTP server error");
                Err(GatewayError::Serve(e.to_string()))
            }
        }
    }

    /// Trigger graceful shutdown. In-flight requests finish first.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the router with its middleware stack
    pub fn router(&self) -> Router {
        let state = AppState {
            controller: self.controller.clone(),
            audit: Arc::clone(&self.audit),
            metrics: Arc::clone(&self.metrics),
        };

        let middleware = ServiceBuilder::new()
            .layer(TracingLayer::new())
            .layer(IpProtectionLayer::new(self.config.security.clone()))
            .layer(TimeoutLayer::new(
                self.config.timeouts.request,
                Arc::clone(&self.metrics),
            ));

        Router::new()
            .route(&self.config.http.path, get(handle_verify))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_snapshot))
            .layer(middleware)
            .with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    controller: GatewayController,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<GatewayMetrics>,
}

/// Handle one verification request
async fn handle_verify(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    client_ip: Option<Extension<ClientIp>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id.map(|Extension(id)| id).unwrap_or_default();
    let client_ip = client_ip
        .map(|Extension(ClientIp(ip))| ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    state.audit.record(AuditEvent::new(
        request_id,
        client_ip,
        uri.to_string(),
        header_str(header::REFERER),
        header_str(header::USER_AGENT),
    ));

    let timer = RequestTimer::new(Arc::clone(&state.metrics));
    let outcome = state.controller.handle(uri.query()).await;
    timer.finish(outcome);

    let (status, message) = map_outcome(outcome);
    info!(outcome = %outcome, status = status.as_u16(), "Verification request finished");
    (status, message).into_response()
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "verify-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.metrics.snapshot()))
}
