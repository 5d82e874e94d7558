//! # Verification Flows
//!
//! Drives complete requests through the router with a real [`TcpNotifier`]
//! talking to a [`FakeWorker`].
//!
//! ## Flows Tested:
//!
//! 1. **Session flow**: `state` + `code` updates the record and hands the token to the worker
//! 2. **User flow**: `user` + `code` looks up a fresh record and sends `userId:email`
//! 3. **Failure paths**: invalid input, offline store, missing record, worker rejection
//!
//! [`TcpNotifier`]: verify_gateway::TcpNotifier
//! [`FakeWorker`]: super::support::FakeWorker

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    use super::super::support::{
        closed_port, config, silent_worker, FakeWorker, Harness, RecordingAuditSink, WINDOW,
    };
    use verify_gateway::{
        GatewayError, GatewayOutcome, InMemoryVerificationStore, TcpNotifier,
        VerificationGatewayService,
    };

    const SESSION_QUERY: &str = "/verify?state=abcd1234abcd1234&code=abc.def-123";
    const USER_QUERY: &str = "/verify?user=12345678&code=abcd1234abcd1234";

    // =============================================================================
    // SESSION FLOW
    // =============================================================================

    #[tokio::test]
    async fn test_session_flow_verified() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");

        let (status, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Verified");
        assert_eq!(worker.payloads(1).await, vec![b"abcd1234abcd1234".to_vec()]);
        assert_eq!(
            harness.store.session_code("abcd1234abcd1234").as_deref(),
            Some("abc.def-123")
        );
    }

    #[tokio::test]
    async fn test_session_replay_is_rejected() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");

        let (first, _) = harness.get(SESSION_QUERY).await;
        let (second, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid or expired code");
        assert_eq!(worker.connections(), 1);
    }

    #[tokio::test]
    async fn test_worker_rejection_is_500() {
        let worker = FakeWorker::spawn(Some(b'x')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");

        let (status, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Could not process request");
        let metrics = harness.service.metrics();
        assert_eq!(metrics.count(GatewayOutcome::NotifyFailed), 1);
    }

    #[tokio::test]
    async fn test_worker_down_is_500() {
        let harness = Harness::new(config(closed_port()));
        harness.store.insert_session("abcd1234abcd1234");

        let (status, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Could not process request");
        // The record stays consumed; a replay cannot re-trigger the worker.
        let (status, _) = harness.get(SESSION_QUERY).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_silent_worker_is_notify_failed_not_timeout() {
        let port = silent_worker().await;
        let mut config = config(port);
        config.downstream.read_timeout = Duration::from_millis(300);
        let harness = Harness::new(config);
        harness.store.insert_session("abcd1234abcd1234");

        let (status, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Could not process request");
        assert_eq!(
            harness.store.session_code("abcd1234abcd1234").as_deref(),
            Some("abc.def-123")
        );
        let snapshot = harness.service.metrics().snapshot();
        assert_eq!(snapshot.notify_failed, 1);
        assert_eq!(snapshot.timed_out, 0);
    }

    #[tokio::test]
    async fn test_request_timeout_shorter_than_stages_refused() {
        let port = silent_worker().await;
        let mut config = config(port);
        config.downstream.read_timeout = Duration::from_secs(3);
        config.timeouts.request = Duration::from_secs(1);
        let notifier = Arc::new(TcpNotifier::new(&config.downstream));

        let result = VerificationGatewayService::new(
            config,
            Arc::new(InMemoryVerificationStore::new(WINDOW)),
            notifier,
            Arc::new(RecordingAuditSink::default()),
        );
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_store_offline_never_contacts_worker() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");
        harness.store.set_available(false);

        let (status, body) = harness.get(SESSION_QUERY).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Server error");
        assert_eq!(worker.connections(), 0);
    }

    // =============================================================================
    // USER FLOW
    // =============================================================================

    #[tokio::test]
    async fn test_user_flow_sends_id_and_email() {
        let worker = FakeWorker::spawn(None).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_user_code(
            "12345678",
            "jane.doe@trojans.dsu.edu",
            "abcd1234abcd1234",
            Utc::now() - chrono::Duration::minutes(3),
        );

        let (status, body) = harness.get(USER_QUERY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Verified");
        assert_eq!(
            worker.payloads(1).await,
            vec![b"12345678:jane.doe@trojans.dsu.edu".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_user_flow_expired_code() {
        let worker = FakeWorker::spawn(None).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_user_code(
            "12345678",
            "jane.doe@trojans.dsu.edu",
            "abcd1234abcd1234",
            Utc::now() - chrono::Duration::minutes(45),
        );

        let (status, body) = harness.get(USER_QUERY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid or expired code");
        assert_eq!(worker.connections(), 0);
    }

    #[tokio::test]
    async fn test_user_flow_unknown_user() {
        let worker = FakeWorker::spawn(None).await;
        let harness = Harness::new(config(worker.port));

        let (status, body) = harness.get(USER_QUERY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid or expired code");
    }

    #[tokio::test]
    async fn test_disabled_flow_is_invalid_request() {
        let worker = FakeWorker::spawn(None).await;
        let mut config = config(worker.port);
        config.flows.user.enabled = false;
        let harness = Harness::new(config);

        let (status, body) = harness.get(USER_QUERY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid request");
        assert_eq!(harness.store.call_count(), 0);
    }

    // =============================================================================
    // INPUT VALIDATION
    // =============================================================================

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");

        for uri in [
            "/verify",
            "/verify?state=abcd1234abcd1234",
            "/verify?code=abc",
            "/verify?state=abcd1234abcd123&code=abc",
            "/verify?state=abcd1234abcd1234xyz&code=abc",
            "/verify?state=abcd1234abcd1234&code=%27%20OR%201%3D1",
            "/verify?state=abcd1234abcd1234&code=a&code=b",
            "/verify?state=abcd1234abcd1234&user=12345678&code=abcd1234abcd1234",
            "/verify?user=12ab5678&code=abcd1234abcd1234",
            "/verify?user=12345678&code=abc.def-123",
        ] {
            let (status, body) = harness.get(uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body, "Invalid request", "{}", uri);
        }

        assert_eq!(harness.store.call_count(), 0);
        assert_eq!(worker.connections(), 0);
        assert!(harness.store.session_code("abcd1234abcd1234").is_none());
    }

    // =============================================================================
    // AUDIT AND OBSERVABILITY
    // =============================================================================

    #[tokio::test]
    async fn test_every_request_is_audited() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");

        harness.get("/verify?state=bad").await;
        harness.get(SESSION_QUERY).await;
        harness.get("/health").await;

        let events = harness.audit.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uri, "/verify?state=bad");
        assert_eq!(events[1].uri, SESSION_QUERY);
        assert_ne!(events[0].request_id, events[1].request_id);
    }

    #[tokio::test]
    async fn test_real_http_round_trip() {
        let worker = FakeWorker::spawn(Some(b'y')).await;
        let harness = Harness::new(config(worker.port));
        harness.store.insert_session("abcd1234abcd1234");
        let service = Arc::new(harness.service);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.serve(listener).await })
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let response = client
            .get(format!("http://{}{}", addr, SESSION_QUERY))
            .header("x-forwarded-for", "198.51.100.4")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.text().await.unwrap(), "Verified");

        // Loopback peer is a trusted proxy by default.
        let events = harness.audit.events.lock().clone();
        assert_eq!(events[0].client_ip.to_string(), "198.51.100.4");

        let metrics: serde_json::Value = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(metrics["verified"], 1);

        drop(client);
        service.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
