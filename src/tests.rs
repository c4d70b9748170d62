//! End-to-end behaviour of the request client and the update stream against
//! mock backends.

use crate::client::{ClientConfig, StreamState, GENERIC_SERVER_MESSAGE};
use crate::context::AppContext;
use crate::error::{ClientError, Result};
use crate::notify::{ACCESS_RESTRICTED_MESSAGE, RATE_LIMIT_MESSAGE};
use crate::session::{Session, SessionProvider, StaticSession};
use crate::types::{ApiRequest, JobStatus};
use async_trait::async_trait;
use mockito::Matcher;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

enum RefreshOutcome {
    NewToken(Session),
    NoToken,
    Fail,
}

struct RefreshingSession {
    current: Mutex<Session>,
    outcome: RefreshOutcome,
    refreshes: AtomicUsize,
}

impl RefreshingSession {
    fn new(session: Session, outcome: RefreshOutcome) -> Arc<Self> {
        Arc::new(RefreshingSession {
            current: Mutex::new(session),
            outcome,
            refreshes: AtomicUsize::new(0),
        })
    }

    fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for RefreshingSession {
    async fn current(&self) -> Option<Session> {
        Some(self.current.lock().clone())
    }

    async fn refresh(&self) -> Result<Option<Session>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            RefreshOutcome::NewToken(session) => {
                *self.current.lock() = session.clone();
                Ok(Some(session.clone()))
            }
            RefreshOutcome::NoToken => Ok(None),
            RefreshOutcome::Fail => Err(ClientError::Config("refresh endpoint down".into())),
        }
    }
}

fn tenant_session(tenant: &str) -> Arc<StaticSession> {
    Arc::new(StaticSession::new(Session::new("tok").with_tenant(tenant)))
}

fn context_with(base: &str, session: Arc<dyn SessionProvider>, tweak: impl FnOnce(&mut ClientConfig)) -> AppContext {
    let mut config = ClientConfig::new(base).unwrap();
    config.retry_delay_ms = 10;
    tweak(&mut config);
    AppContext::new(config, session).unwrap()
}

fn context(base: &str, session: Arc<dyn SessionProvider>) -> AppContext {
    context_with(base, session, |_| {})
}

async fn wait_for(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ========== CSRF ==========

#[tokio::test]
async fn test_mutating_call_bootstraps_csrf_once() {
    let mut server = mockito::Server::new_async().await;
    let csrf = server
        .mock("GET", "/csrf")
        .with_header("content-type", "application/json")
        .with_body(r#"{"csrf_token": "boot-token"}"#)
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/jobs")
        .match_header("x-csrf-token", "boot-token")
        .match_header("content-type", "application/json")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let request = assert_ok!(ApiRequest::post("jobs").with_json(&json!({"job_type": "export"})));
    let response = assert_ok!(context.client().send(request).await);

    assert_eq!(response.status.as_u16(), 201);
    csrf.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_csrf_cookie_is_used_without_bootstrap() {
    let mut server = mockito::Server::new_async().await;
    let csrf = server.mock("GET", "/csrf").expect(0).create_async().await;
    let delete = server
        .mock("DELETE", "/jobs/1")
        .match_header("x-csrf-token", "cookie-token")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    context
        .cookies()
        .add_cookie_str("csrf_token=cookie-token; Path=/", &context.config().api_base);

    let response = assert_ok!(context.client().delete("jobs/1").await);
    assert_eq!(response.status.as_u16(), 204);
    csrf.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn test_safe_methods_never_carry_csrf() {
    let mut server = mockito::Server::new_async().await;
    let csrf = server.mock("GET", "/csrf").expect(0).create_async().await;
    let get = server
        .mock("GET", "/jobs")
        .match_header("x-csrf-token", Matcher::Missing)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;
    let head = server
        .mock("HEAD", "/jobs")
        .match_header("x-csrf-token", Matcher::Missing)
        .expect(1)
        .create_async()
        .await;
    let options = server
        .mock("OPTIONS", "/jobs")
        .match_header("x-csrf-token", Matcher::Missing)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    context
        .cookies()
        .add_cookie_str("csrf_token=present; Path=/", &context.config().api_base);

    for method in [http::Method::GET, http::Method::HEAD, http::Method::OPTIONS] {
        let response = assert_ok!(context.client().send(ApiRequest::new(method, "jobs")).await);
        assert!(response.is_success());
    }

    csrf.assert_async().await;
    get.assert_async().await;
    head.assert_async().await;
    options.assert_async().await;
}

#[tokio::test]
async fn test_csrf_bootstrap_failure_fails_open() {
    let mut server = mockito::Server::new_async().await;
    let csrf = server.mock("GET", "/csrf").with_status(503).expect(1).create_async().await;
    let create = server
        .mock("PUT", "/jobs/1")
        .match_header("x-csrf-token", Matcher::Missing)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let request = assert_ok!(ApiRequest::put("jobs/1").with_json(&json!({"name": "x"})));
    let response = assert_ok!(context.client().send(request).await);

    assert!(response.is_success());
    csrf.assert_async().await;
    create.assert_async().await;
}

// ========== 401 refresh ==========

#[tokio::test]
async fn test_401_refresh_replays_once() {
    let mut server = mockito::Server::new_async().await;
    let stale = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer new")
        .with_body(r#"{"name": "ada"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = RefreshingSession::new(
        Session::new("old"),
        RefreshOutcome::NewToken(Session::new("new")),
    );
    let context = context(&server.url(), session.clone());

    let response = assert_ok!(context.client().send(ApiRequest::get("me")).await);
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(session.refreshes(), 1);
    stale.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_401_failed_refresh_returns_original() {
    for outcome in [RefreshOutcome::Fail, RefreshOutcome::NoToken] {
        let mut server = mockito::Server::new_async().await;
        let me = server
            .mock("GET", "/me")
            .with_status(401)
            .with_body(r#"{"message": "expired"}"#)
            .expect(1)
            .create_async()
            .await;

        let session = RefreshingSession::new(Session::new("old"), outcome);
        let context = context(&server.url(), session.clone());

        let response = assert_ok!(context.client().send(ApiRequest::get("me")).await);
        assert_eq!(response.status.as_u16(), 401);
        assert_eq!(response.text(), r#"{"message": "expired"}"#);
        assert_eq!(session.refreshes(), 1);
        me.assert_async().await;
    }
}

#[tokio::test]
async fn test_second_401_is_not_refreshed_again() {
    let mut server = mockito::Server::new_async().await;
    let me = server.mock("GET", "/me").with_status(401).expect(2).create_async().await;

    let session = RefreshingSession::new(
        Session::new("old"),
        RefreshOutcome::NewToken(Session::new("new")),
    );
    let context = context(&server.url(), session.clone());

    let response = assert_ok!(context.client().send(ApiRequest::get("me")).await);
    assert_eq!(response.status.as_u16(), 401);
    assert_eq!(session.refreshes(), 1);
    me.assert_async().await;
}

// ========== 503 / 403 / 429 ==========

#[tokio::test]
async fn test_503_backs_off_and_returns_last_response() {
    let mut server = mockito::Server::new_async().await;
    let flaky = server
        .mock("GET", "/reports")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.retry_delay_ms = 50;
    });

    let start = Instant::now();
    let response = assert_ok!(context.client().send_with_retry(ApiRequest::get("reports"), 3).await);

    // 50 ms then 100 ms, nothing after the last attempt.
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(response.status.as_u16(), 503);
    assert!(response.sanitized);
    flaky.assert_async().await;
}

#[tokio::test]
async fn test_503_then_success() {
    let mut server = mockito::Server::new_async().await;
    let down = server
        .mock("GET", "/reports")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.retry_delay_ms = 500;
    });
    let client = context.client().clone();
    let call = tokio::spawn(async move { client.send_with_retry(ApiRequest::get("reports"), 3).await });

    // Swap the backend while the client sleeps through its first backoff.
    let start = Instant::now();
    while !down.matched_async().await && start.elapsed() < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    down.remove_async().await;
    let up = server
        .mock("GET", "/reports")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let response = assert_ok!(assert_ok!(call.await));
    assert!(response.is_success());
    up.assert_async().await;
}

#[tokio::test]
async fn test_403_shows_access_restricted() {
    let mut server = mockito::Server::new_async().await;
    let admin = server
        .mock("GET", "/admin")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let response = assert_ok!(context.client().get("admin").await);

    assert_eq!(response.status.as_u16(), 403);
    let toasts = context.toasts().visible();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, ACCESS_RESTRICTED_MESSAGE);
    admin.assert_async().await;
}

#[tokio::test]
async fn test_429_warning_is_shown_once() {
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", "/search")
        .with_status(429)
        .expect(2)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    for _ in 0..2 {
        let response = assert_ok!(context.client().send(ApiRequest::get("search")).await);
        assert_eq!(response.status.as_u16(), 429);
    }

    let toasts = context.toasts().visible();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, RATE_LIMIT_MESSAGE);
    limited.assert_async().await;
}

// ========== 5xx sanitization ==========

#[tokio::test]
async fn test_500_stack_trace_is_scrubbed() {
    let mut server = mockito::Server::new_async().await;
    let _boom = server
        .mock("GET", "/jobs")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"message": "Traceback (most recent call last):\n  File \"/srv/app/jobs.py\", line 12, in list_jobs"}"#,
        )
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let response = assert_ok!(context.client().send(ApiRequest::get("jobs")).await);

    assert_eq!(response.status.as_u16(), 500);
    let body: Value = assert_ok!(response.json());
    assert_eq!(body["error"], "Internal Server Error");
    assert_eq!(body["message"], GENERIC_SERVER_MESSAGE);
    assert_eq!(body["code"], "SERVER_ERROR");
    assert!(!response.text().contains("Traceback"));
}

#[tokio::test]
async fn test_500_plain_message_survives_in_envelope() {
    let mut server = mockito::Server::new_async().await;
    let _boom = server
        .mock("GET", "/jobs")
        .with_status(502)
        .with_body(r#"{"detail": "Upstream export service unavailable", "trace_id": "abc"}"#)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let response = assert_ok!(context.client().send(ApiRequest::get("jobs")).await);

    let body: Value = assert_ok!(response.json());
    assert_eq!(body["message"], "Upstream export service unavailable");
    assert!(body.get("trace_id").is_none());
}

// ========== Tenant isolation ==========

#[tokio::test]
async fn test_cross_tenant_response_is_a_security_error() {
    let mut server = mockito::Server::new_async().await;
    let leak = server
        .mock("GET", "/projects")
        .with_header("content-type", "application/json")
        .with_body(r#"[{"tenant_id": "A", "name": "ours"}, {"tenant_id": "B", "name": "theirs"}]"#)
        .expect(1)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let err = assert_err!(context.client().send_with_retry(ApiRequest::get("projects"), 3).await);

    assert!(err.is_security());
    assert!(!err.is_retryable());
    leak.assert_async().await;
}

#[tokio::test]
async fn test_same_tenant_response_passes() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/projects")
        .with_body(r#"{"tenant_id": "A", "members": [{"tenant_id": "A"}]}"#)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let response = assert_ok!(context.client().get("projects").await);
    assert!(response.is_success());
}

#[tokio::test]
async fn test_error_bodies_are_not_tenant_scanned() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/projects/9")
        .with_status(404)
        .with_body(r#"{"tenant_id": "B"}"#)
        .create_async()
        .await;

    let context = context(&server.url(), tenant_session("A"));
    let response = assert_ok!(context.client().send(ApiRequest::get("projects/9")).await);
    assert_eq!(response.status.as_u16(), 404);
}

// ========== Transport failures ==========

#[tokio::test]
async fn test_timeout_cancels_call() {
    let listener = assert_ok!(tokio::net::TcpListener::bind("127.0.0.1:0").await);
    let addr = assert_ok!(listener.local_addr());
    let hold = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    let context = context(&format!("http://{}", addr), tenant_session("A"));
    let request = ApiRequest::get("slow").with_timeout(Duration::from_millis(100));
    let err = assert_err!(context.client().send(request).await);

    assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(100)));
    hold.abort();
}

#[tokio::test]
async fn test_network_error_propagates_after_retries() {
    let context = context("http://127.0.0.1:9", tenant_session("A"));
    let err = assert_err!(context.client().send_with_retry(ApiRequest::get("jobs"), 2).await);
    assert!(matches!(err, ClientError::Network(_)));
}

// ========== Update stream ==========

const STREAM_BODY: &str = "id: 41\nevent: job_update\ndata: [{\"id\": \"j1\", \"job_type\": \"export\", \"status\": \"failed\", \"updated_at\": \"2024-05-01T10:00:00Z\", \"error_message\": \"disk full\"}]\n\n: keep-alive\n\n";

#[tokio::test]
async fn test_stream_error_schedules_single_reconnect() {
    let mut server = mockito::Server::new_async().await;
    let stream_mock = server
        .mock("GET", "/jobs/stream")
        .match_header("accept", "text/event-stream")
        .with_header("content-type", "text/event-stream")
        .with_body(STREAM_BODY)
        .expect(1)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.reconnect_delay_ms = 2_000;
    });
    let updates = context.updates().clone();

    assert!(context.start_session().await);
    assert!(wait_for(|| updates.state() == StreamState::Errored, Duration::from_secs(2)).await);

    // The batch landed before the stream ended.
    let job = context.jobs().get("j1").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(context.toasts().visible()[0].message.contains("disk full"));

    // init() while a reconnect is pending is a no-op.
    assert!(!updates.init().await);
    assert!(!updates.init().await);
    assert_eq!(updates.state(), StreamState::Errored);
    assert!(updates.reconnect_pending());
    stream_mock.assert_async().await;

    context.teardown();
    assert_eq!(updates.state(), StreamState::Disconnected);
    assert!(!updates.reconnect_pending());
    assert!(context.jobs().is_empty());
}

#[tokio::test]
async fn test_stream_reconnects_once_with_last_event_id() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/jobs/stream")
        .match_header("last-event-id", Matcher::Missing)
        .with_header("content-type", "text/event-stream")
        .with_body(STREAM_BODY)
        .expect(1)
        .create_async()
        .await;
    let resumed = server
        .mock("GET", "/jobs/stream")
        .match_header("last-event-id", "41")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.reconnect_delay_ms = 300;
    });
    let mut batches = context.updates().subscribe();

    let start = Instant::now();
    assert!(context.start_session().await);
    let batch = tokio::time::timeout(Duration::from_secs(2), batches.next_batch())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch[0].id, "j1");

    while !resumed.matched_async().await && start.elapsed() < Duration::from_secs(3) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // One reconnect, and not before the fixed delay.
    assert!(start.elapsed() >= Duration::from_millis(300));
    context.teardown();
    first.assert_async().await;
    resumed.assert_async().await;
}

#[tokio::test]
async fn test_dropped_context_stops_reconnecting() {
    let mut server = mockito::Server::new_async().await;
    let stream_mock = server
        .mock("GET", "/jobs/stream")
        .with_header("content-type", "text/event-stream")
        .with_body(STREAM_BODY)
        .expect(1)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.reconnect_delay_ms = 300;
    });
    let mut batches = context.updates().subscribe();
    assert!(context.start_session().await);

    let first = tokio::time::timeout(Duration::from_secs(2), batches.next_batch()).await;
    assert!(first.unwrap().is_some());

    drop(context);
    let end = tokio::time::timeout(Duration::from_secs(2), batches.next_batch()).await;
    assert_eq!(end.unwrap(), None);

    // Past the reconnect delay, still a single connection.
    tokio::time::sleep(Duration::from_millis(600)).await;
    stream_mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_rejected_status_goes_errored() {
    let mut server = mockito::Server::new_async().await;
    let _denied = server
        .mock("GET", "/jobs/stream")
        .with_status(401)
        .create_async()
        .await;

    let context = context_with(&server.url(), tenant_session("A"), |config| {
        config.reconnect_delay_ms = 5_000;
    });
    let updates = context.updates().clone();

    assert!(context.start_session().await);
    assert!(wait_for(|| updates.state() == StreamState::Errored, Duration::from_secs(2)).await);
    assert!(context.jobs().is_empty());

    updates.disconnect();
    assert_eq!(updates.state(), StreamState::Disconnected);
}
