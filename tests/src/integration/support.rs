//! Test fixtures shared by the integration flows.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use verify_gateway::domain::config::GatewayConfig;
use verify_gateway::domain::{AuditEvent, StoreConfig};
use verify_gateway::{
    AuditSink, InMemoryVerificationStore, TcpNotifier, VerificationGatewayService,
};

/// Freshness window used by the in-memory store
pub const WINDOW: Duration = Duration::from_secs(30 * 60);

/// Stand-in for the local worker: accepts connections, reads one payload
/// (up to 100 bytes) and optionally answers with a single byte.
pub struct FakeWorker {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeWorker {
    pub async fn spawn(reply: Option<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let (conn_count, payloads) = (Arc::clone(&connections), Arc::clone(&received));
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                conn_count.fetch_add(1, Ordering::SeqCst);
                let payloads = Arc::clone(&payloads);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 100];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    buf.truncate(n);
                    payloads.lock().push(buf);
                    if let Some(byte) = reply {
                        let _ = socket.write_all(&[byte]).await;
                    }
                });
            }
        });

        Self {
            port,
            connections,
            received,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait briefly for `count` payloads, then return what arrived.
    pub async fn payloads(&self, count: usize) -> Vec<Vec<u8>> {
        for _ in 0..50 {
            if self.received.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received.lock().clone()
    }
}

/// Worker that accepts connections and never answers or closes them.
/// Returns its port.
pub async fn silent_worker() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    port
}

/// Audit sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn config(downstream_port: u16) -> GatewayConfig {
    let mut config =
        GatewayConfig::with_store(StoreConfig::new("localhost", "gateway", "secret", "discord"));
    config.downstream.port = downstream_port;
    config.downstream.connect_timeout = Duration::from_millis(500);
    config.downstream.read_timeout = Duration::from_millis(500);
    config
}

/// Everything a flow test needs to drive and inspect one gateway.
pub struct Harness {
    pub service: VerificationGatewayService,
    pub store: Arc<InMemoryVerificationStore>,
    pub audit: Arc<RecordingAuditSink>,
}

impl Harness {
    pub fn new(config: GatewayConfig) -> Self {
        let store = Arc::new(InMemoryVerificationStore::new(WINDOW));
        let audit = Arc::new(RecordingAuditSink::default());
        let notifier = Arc::new(TcpNotifier::new(&config.downstream));
        let service = VerificationGatewayService::new(
            config,
            store.clone(),
            notifier,
            audit.clone(),
        )
        .unwrap();

        Self {
            service,
            store,
            audit,
        }
    }

    pub fn router(&self) -> Router {
        self.service.router()
    }

    /// Send a GET through the full middleware stack.
    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        send(self.router(), uri).await
    }
}

pub async fn send(router: Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), 4096).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
