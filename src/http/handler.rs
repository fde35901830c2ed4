//! Main axum router and webhook handlers.
//!
//! Routes:
//! - `POST /config`  - Route resolution for a new connection
//! - `POST /pubkey`  - Public-key authentication
//! - `GET  /healthz` - Health check
//! - `GET  /metrics` - Prometheus metrics

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::webhook::{AuthResponse, ConfigRequest, ConfigResponse, ErrorResponse, PublicKeyAuthRequest};
use crate::auth::VerifyError;
use crate::identity::MalformedIdentity;
use crate::metrics::Outcome;
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", post(handle_config))
        .route("/pubkey", post(handle_pubkey))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /config`
///
/// Tells the gateway which backend to proxy the connection to and which host
/// keys it may accept there.
#[instrument(skip_all)]
async fn handle_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<ConfigResponse>, AppError> {
    let Json(req) = payload?;
    let counters = &state.metrics.metrics.config_requests_total;

    let route = state.resolver.resolve(&req.username).map_err(|e| {
        counters.get_or_create(&Outcome::MalformedIdentity.labels()).inc();
        AppError::Identity(e)
    })?;
    counters.get_or_create(&Outcome::Resolved.labels()).inc();

    info!(
        username = %req.username,
        remote_address = %req.remote_address,
        connection_id = %req.connection_id,
        client_version = %req.client_version,
        target = %route.target_host,
        "route resolved"
    );
    Ok(Json(route.into()))
}

/// `POST /pubkey`
///
/// Answers 200 with `success: false` for a wrong key.  Requests that cannot
/// be decided (bad username, unknown user, unparsable key, store failure)
/// get a 500 so the gateway rejects the attempt.
#[instrument(skip_all)]
async fn handle_pubkey(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PublicKeyAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(req) = payload?;
    let metrics = &state.metrics.metrics;

    let started = Instant::now();
    let result = state.verifier.verify(&req.username, &req.public_key).await;
    metrics
        .pubkey_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    let outcome = match &result {
        Ok(verdict) if verdict.success => Outcome::Accepted,
        Ok(_) => Outcome::Rejected,
        Err(VerifyError::MalformedIdentity(_)) => Outcome::MalformedIdentity,
        Err(VerifyError::UserNotFound { .. }) => Outcome::UserNotFound,
        Err(VerifyError::KeyParse(_)) => Outcome::KeyParseError,
        Err(VerifyError::Store(_)) => Outcome::StoreError,
    };
    metrics
        .pubkey_requests_total
        .get_or_create(&outcome.labels())
        .inc();

    let verdict = result?;
    if verdict.success {
        info!(
            username = %req.username,
            remote_address = %req.remote_address,
            connection_id = %req.connection_id,
            "public key accepted"
        );
    } else {
        warn!(
            username = %req.username,
            remote_address = %req.remote_address,
            connection_id = %req.connection_id,
            "public key rejected"
        );
    }
    Ok(Json(verdict.into()))
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        store: Arc::clone(&state.store),
    };
    crate::health::health_handler(State(health_state)).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the service.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state.metrics.encode()?;
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
///
/// The gateway treats every non-200 answer as a refusal, so all variants
/// share one status code; the `error` field and the log line tell them apart.
#[derive(Debug)]
pub enum AppError {
    /// The request body was not a valid webhook payload.
    BadRequest(String),
    /// The username does not carry an owner and backend target.
    Identity(MalformedIdentity),
    /// The public-key check could not reach a verdict.
    Verify(VerifyError),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Identity(_) => "malformed_identity",
            AppError::Verify(e) => e.kind(),
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match &self {
            AppError::BadRequest(msg) => {
                warn!(error = %msg, "failed to decode webhook body");
                msg.clone()
            }
            AppError::Identity(e) => {
                warn!(error = %e, "rejecting malformed username");
                e.to_string()
            }
            AppError::Verify(e @ VerifyError::Store(_)) => {
                error!(error = %e, "user store lookup failed");
                "internal error".to_string()
            }
            AppError::Verify(e) => {
                warn!(error = %e, kind, "public key check undecided");
                e.to_string()
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                format!("Internal server error: {err:#}")
            }
        };

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: kind,
                message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        AppError::Verify(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::key::tests::{ed25519_blob, ed25519_line};
    use crate::metrics::MetricsRegistry;
    use crate::route::TrustedFingerprints;
    use crate::store::memory::MemoryUserStore;
    use crate::store::{StoreError, UserRecord, UserStore};

    fn router() -> (Router, Arc<AppState>) {
        let mut store = MemoryUserStore::default();
        store.insert("alice".to_string(), ed25519_blob(1));
        router_with(Arc::new(store))
    }

    fn router_with(store: Arc<dyn UserStore>) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(
            TrustedFingerprints::new(vec!["SHA256:backend".to_string()]),
            store,
            MetricsRegistry::new(),
        ));
        (create_router(Arc::clone(&state)), state)
    }

    /// Store whose database is unreachable.
    struct UnreachableStore;

    #[async_trait::async_trait]
    impl UserStore for UnreachableStore {
        async fn get_user(&self, _owner: &str) -> Result<UserRecord, StoreError> {
            Err(StoreError::Backend {
                reason: "connection refused by 10.9.8.7:5432".to_string(),
                source: None,
            })
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "postgres"
        }
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ── /config ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_config_routes_to_target() {
        let (app, _) = router();
        let (status, body) = post_json(
            app,
            "/config",
            serde_json::json!({"username": "alice#gpu-box-1", "connectionId": "c1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["backend"], "sshproxy");
        assert_eq!(body["config"]["sshproxy"]["server"], "gpu-box-1");
        assert_eq!(body["config"]["sshproxy"]["port"], 2222);
        assert_eq!(body["config"]["sshproxy"]["username"], "envd");
        assert_eq!(
            body["config"]["sshproxy"]["allowedHostKeyFingerprints"],
            serde_json::json!(["SHA256:backend"])
        );
    }

    #[tokio::test]
    async fn test_config_malformed_username() {
        let (app, state) = router();
        let (status, body) = post_json(
            app,
            "/config",
            serde_json::json!({"username": "malformed-no-delimiter"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "malformed_identity");
        let count = state
            .metrics
            .metrics
            .config_requests_total
            .get_or_create(&Outcome::MalformedIdentity.labels())
            .get();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_config_bad_body() {
        let (app, _) = router();
        let (status, body) = post_json(app, "/config", serde_json::json!({"user": "x"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "bad_request");
    }

    // ── /pubkey ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_pubkey_accepts_stored_key() {
        let (app, state) = router();
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "alice#gpu-box-1", "publicKey": ed25519_line(1)}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"success": true}));
        let accepted = state
            .metrics
            .metrics
            .pubkey_requests_total
            .get_or_create(&Outcome::Accepted.labels())
            .get();
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_pubkey_rejects_other_key() {
        let (app, _) = router();
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "alice#gpu-box-1", "publicKey": ed25519_line(2)}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"success": false}));
    }

    #[tokio::test]
    async fn test_pubkey_unknown_user() {
        let (app, _) = router();
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "carol#gpu-box-1", "publicKey": ed25519_line(1)}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "user_not_found");
    }

    #[tokio::test]
    async fn test_pubkey_malformed_username() {
        let (app, _) = router();
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "malformed-no-delimiter", "publicKey": ed25519_line(1)}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "malformed_identity");
    }

    #[tokio::test]
    async fn test_pubkey_unparsable_key() {
        let (app, _) = router();
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "alice#gpu-box-1", "publicKey": "not a key"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "key_parse_error");
    }

    #[tokio::test]
    async fn test_pubkey_store_failure_hides_detail() {
        let (app, state) = router_with(Arc::new(UnreachableStore));
        let (status, body) = post_json(
            app,
            "/pubkey",
            serde_json::json!({"username": "alice#gpu-box-1", "publicKey": ed25519_line(1)}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "store_error");
        let message = body["message"].as_str().unwrap();
        assert!(!message.contains("connection refused"));
        assert!(!message.contains("10.9.8.7"));
        let failures = state
            .metrics
            .metrics
            .pubkey_requests_total
            .get_or_create(&Outcome::StoreError.labels())
            .get();
        assert_eq!(failures, 1);
    }

    // ── operational ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_healthz() {
        let (app, _) = router();
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["store"]["ok"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = router();
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("sshgate_trusted_fingerprints 1"));
    }
}
