use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::gateway::GatewayLayerState;
use super::health;
use super::middleware::{logging_middleware, metrics_middleware, security_headers_middleware};
use super::state::AppState;
use super::v1;
use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    let gateway = GatewayLayerState::from_app_state(&state);

    Router::new()
        // Probes stay outside the gateway
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/v1", v1::create_v1_router(gateway))
        .with_state(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Router plus the Prometheus endpoint when metrics are enabled
pub fn create_router_with_metrics(
    state: AppState,
    metrics: Option<PrometheusMetrics>,
    metrics_path: &str,
) -> Router {
    let router = create_router(state);

    match metrics {
        Some(m) => router.merge(create_metrics_router(m, metrics_path)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::ConnectInfo;

    use axum::body::Body;
    use axum::http::{header, Request, Response, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::domain::api_key::{ApiKeyTier, OwnerId};
    use crate::domain::auth::Role;
    use crate::domain::rate_limit::{FailurePolicy, ManualClock, RateLimitStore};
    use crate::infrastructure::api_key::{ApiKeyService, InMemoryApiKeyRepository};
    use crate::infrastructure::auth::{CredentialAuthenticator, InMemoryRoleStore, JwtConfig, JwtService};
    use crate::infrastructure::rate_limit::{InMemoryRateLimitStore, RateLimiter};
    use crate::infrastructure::usage::{InMemoryUsageSink, UsageRecorder};

    const JWT_SECRET: &str = "router-test-secret";

    struct TestApp {
        router: Router,
        api_keys: Arc<ApiKeyService>,
        roles: InMemoryRoleStore,
        jwt: JwtService,
        clock: Arc<ManualClock>,
        usage: InMemoryUsageSink,
    }

    fn hour_start() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 - 1_700_000_000 % 3_600, 0)
            .unwrap()
    }

    fn build_app(
        store: Arc<dyn RateLimitStore>,
        policy: FailurePolicy,
        trust_proxy: bool,
    ) -> TestApp {
        let api_keys = Arc::new(ApiKeyService::new(Arc::new(
            InMemoryApiKeyRepository::new(),
        )));
        let roles = InMemoryRoleStore::new();
        let jwt = JwtService::new(JwtConfig::new(JWT_SECRET, 1));
        let clock = Arc::new(ManualClock::new(hour_start()));
        let usage = InMemoryUsageSink::new();

        let authenticator = Arc::new(CredentialAuthenticator::new(
            api_keys.clone(),
            Arc::new(jwt.clone()),
            Arc::new(roles.clone()),
        ));
        let limiter = Arc::new(
            RateLimiter::new(store)
                .with_clock(clock.clone())
                .with_window(Duration::from_secs(3600))
                .with_failure_policy(policy),
        );
        let (recorder, _worker) = UsageRecorder::spawn(Arc::new(usage.clone()), 64);

        let state = AppState::new(api_keys.clone(), authenticator, limiter, recorder)
            .with_trust_proxy(trust_proxy);

        TestApp {
            router: create_router(state),
            api_keys,
            roles,
            jwt,
            clock,
            usage,
        }
    }

    /// Gateway behind a reverse proxy that sets `X-Forwarded-For`
    fn test_app() -> TestApp {
        build_app(Arc::new(InMemoryRateLimitStore::new()), FailurePolicy::Closed, true)
    }

    /// Gateway exposed directly to clients
    fn direct_app() -> TestApp {
        build_app(Arc::new(InMemoryRateLimitStore::new()), FailurePolicy::Closed, false)
    }

    fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        request
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::empty())
            .unwrap()
    }

    fn with_header(mut request: Request<Body>, name: &'static str, value: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(name, value.parse().unwrap());
        request
    }

    fn bearer(request: Request<Body>, token: &str) -> Request<Body> {
        with_header(request, "authorization", &format!("Bearer {}", token))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header_value(response: &Response<Body>, name: &str) -> String {
        response.headers()[name].to_str().unwrap().to_string()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
        app.router.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_health_bypasses_gateway() {
        let app = test_app();

        let response = send(&app, get("/health")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_ready_reports_store_health() {
        let app = test_app();

        let response = send(&app, get("/ready")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_anonymous_ping_carries_rate_limit_headers() {
        let app = test_app();

        let response = send(&app, get("/v1/ping")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, "x-ratelimit-limit"), "100");
        assert_eq!(header_value(&response, "x-ratelimit-remaining"), "99");
        assert_eq!(
            header_value(&response, "x-ratelimit-reset"),
            (hour_start().timestamp() + 3_600).to_string()
        );
        assert_eq!(header_value(&response, "x-content-type-options"), "nosniff");

        let body = body_json(response).await;
        assert_eq!(body["message"], "pong");
        assert_eq!(body["identity"], "anonymous");
    }

    #[tokio::test]
    async fn test_free_tier_hourly_quota() {
        let app = test_app();
        let t0 = hour_start();

        for i in 1..=100u32 {
            let response = send(&app, get("/v1/ping")).await;
            assert_eq!(response.status(), StatusCode::OK, "request {}", i);
            assert_eq!(
                header_value(&response, "x-ratelimit-remaining"),
                (100 - i).to_string()
            );
        }

        app.clock.set(t0 + chrono::Duration::minutes(10));
        let denied = send(&app, get("/v1/ping")).await;

        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_value(&denied, "x-ratelimit-remaining"), "0");
        assert_eq!(header_value(&denied, "retry-after"), "3000");

        let body = body_json(denied).await;
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["details"]["current"], 100);
        assert_eq!(body["details"]["limit"], 100);
        assert_eq!(body["details"]["retry_after"], 3000);

        app.clock.set(t0 + chrono::Duration::minutes(61));
        let fresh = send(&app, get("/v1/ping")).await;

        assert_eq!(fresh.status(), StatusCode::OK);
        assert_eq!(header_value(&fresh, "x-ratelimit-remaining"), "99");
    }

    #[tokio::test]
    async fn test_clients_are_limited_independently() {
        let app = test_app();

        for _ in 0..100 {
            send(&app, get("/v1/ping")).await;
        }

        let other = with_header(get("/v1/ping"), "x-forwarded-for", "198.51.100.77");
        let response = send(&app, other).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, "x-ratelimit-remaining"), "99");
    }

    #[tokio::test]
    async fn test_forged_forwarding_headers_share_peer_bucket() {
        let app = direct_app();

        for i in 0..100u32 {
            let request = with_header(
                from_peer(get("/v1/ping"), [192, 0, 2, 50]),
                "x-forwarded-for",
                &format!("198.51.100.{}", i),
            );
            assert_eq!(send(&app, request).await.status(), StatusCode::OK);
        }

        let forged = with_header(
            from_peer(get("/v1/ping"), [192, 0, 2, 50]),
            "x-forwarded-for",
            "203.0.113.250",
        );
        let response = send(&app, forged).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let other_peer = send(&app, from_peer(get("/v1/ping"), [192, 0, 2, 51])).await;
        assert_eq!(other_peer.status(), StatusCode::OK);
        assert_eq!(header_value(&other_peer, "x-ratelimit-remaining"), "99");
    }

    #[tokio::test]
    async fn test_direct_client_recorded_by_peer_address() {
        let app = direct_app();
        let token = app.jwt.issue("user-77", None).unwrap();

        let request = bearer(from_peer(get("/v1/whoami"), [192, 0, 2, 60]), &token);
        let body = body_json(send(&app, request).await).await;

        assert_eq!(body["ip_address"], "192.0.2.60");
    }

    #[tokio::test]
    async fn test_malformed_api_key_is_rejected_not_downgraded() {
        let app = test_app();

        let response = send(&app, with_header(get("/v1/ping"), "x-api-key", "gdk_nope")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
        assert_eq!(body_json(response).await["error"], "invalid_api_key");
    }

    #[tokio::test]
    async fn test_invalid_bearer_token() {
        let app = test_app();

        let response = send(&app, bearer(get("/v1/ping"), "not-a-jwt")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_whoami_requires_identity() {
        let app = test_app();

        let response = send(&app, get("/v1/whoami")).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "authentication_required");
    }

    #[tokio::test]
    async fn test_whoami_with_bearer_token() {
        let app = test_app();
        let token = app
            .jwt
            .issue("user-77", Some("sam@example.com".to_string()))
            .unwrap();

        let response = send(&app, bearer(get("/v1/whoami"), &token)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, "x-ratelimit-limit"), "1000");

        let body = body_json(response).await;
        assert_eq!(body["identity"]["type"], "user");
        assert_eq!(body["identity"]["user_id"], "user-77");
        assert_eq!(body["identity"]["role"], "user");
        assert_eq!(body["rate_limit_tier"], "basic");
        assert_eq!(body["ip_address"], "203.0.113.10");
    }

    #[tokio::test]
    async fn test_api_key_takes_precedence_over_bearer() {
        let app = test_app();
        let created = app
            .api_keys
            .create_key(OwnerId::new("user-9"), "Meter sync", ApiKeyTier::Premium, None)
            .await
            .unwrap();
        let token = app.jwt.issue("someone-else", None).unwrap();

        let request = bearer(
            with_header(get("/v1/whoami"), "x-api-key", &created.secret),
            &token,
        );
        let response = send(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, "x-ratelimit-limit"), "10000");

        let body = body_json(response).await;
        assert_eq!(body["identity"]["type"], "api_key");
        assert_eq!(body["identity"]["owner_id"], "user-9");
        assert!(!body.to_string().contains(&created.secret));
    }

    #[tokio::test]
    async fn test_key_lifecycle_over_http() {
        let app = test_app();
        let token = app.jwt.issue("user-5", None).unwrap();

        let create = bearer(
            json_request(
                "POST",
                "/v1/keys",
                serde_json::json!({"name": "Pump uploader", "tier": "basic"}),
            ),
            &token,
        );
        let response = send(&app, create).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let created = body_json(response).await;
        let secret = created["secret"].as_str().unwrap().to_string();
        let key_id = created["id"].as_str().unwrap().to_string();
        assert!(secret.starts_with("gdk_"));
        assert_eq!(created["key_prefix"], secret[..12]);
        assert!(created.get("key_hash").is_none());

        let list = send(&app, bearer(get("/v1/keys"), &token)).await;
        let listed = body_json(list).await;
        assert_eq!(listed["total"], 1);
        assert!(listed["api_keys"][0].get("secret").is_none());

        let ping = send(&app, with_header(get("/v1/ping"), "x-api-key", &secret)).await;
        assert_eq!(ping.status(), StatusCode::OK);
        assert_eq!(header_value(&ping, "x-ratelimit-limit"), "1000");

        let revoke = bearer(
            json_request("POST", &format!("/v1/keys/{}/revoke", key_id), Value::Null),
            &token,
        );
        let revoked = send(&app, revoke).await;
        assert_eq!(revoked.status(), StatusCode::OK);
        assert_eq!(body_json(revoked).await["is_active"], false);

        let after_revoke = send(&app, with_header(get("/v1/ping"), "x-api-key", &secret)).await;
        assert_eq!(after_revoke.status(), StatusCode::UNAUTHORIZED);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/keys/{}", key_id))
            .body(Body::empty())
            .unwrap();
        let deleted = send(&app, bearer(delete, &token)).await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = send(&app, bearer(get(&format!("/v1/keys/{}", key_id)), &token)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(missing).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_created_key_cannot_exceed_creator_permissions() {
        let app = test_app();
        let token = app.jwt.issue("user-5", None).unwrap();

        let create = bearer(
            json_request(
                "POST",
                "/v1/keys",
                serde_json::json!({"name": "Escalate", "permissions": ["admin:all", "write:*"]}),
            ),
            &token,
        );
        let response = send(&app, create).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "forbidden");
        assert!(app.api_keys.list_keys(&OwnerId::new("user-5")).await.unwrap().is_empty());

        let scoped = bearer(
            json_request(
                "POST",
                "/v1/keys",
                serde_json::json!({"name": "Reader", "permissions": ["read:glucose:own"]}),
            ),
            &token,
        );
        let response = send(&app, scoped).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["permissions"], serde_json::json!(["read:glucose:own"]));
    }

    #[tokio::test]
    async fn test_rate_limit_override_above_tier_is_forbidden() {
        let app = test_app();
        let token = app.jwt.issue("user-5", None).unwrap();

        let create = bearer(
            json_request(
                "POST",
                "/v1/keys",
                serde_json::json!({"name": "Bulk", "tier": "free", "rate_limit_per_hour": 1000000}),
            ),
            &token,
        );
        let response = send(&app, create).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        app.roles.assign("admin-1", Role::Admin).await;
        let admin = app.jwt.issue("admin-1", None).unwrap();
        let create = bearer(
            json_request(
                "POST",
                "/v1/keys",
                serde_json::json!({"name": "Bulk", "tier": "free", "rate_limit_per_hour": 1000000}),
            ),
            &admin,
        );
        let response = send(&app, create).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["rate_limit_per_hour"], 1000000);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_to_owner() {
        let app = test_app();
        let created = app
            .api_keys
            .create_key(OwnerId::new("owner-a"), "Mine", ApiKeyTier::Free, None)
            .await
            .unwrap();
        let intruder = app.jwt.issue("owner-b", None).unwrap();

        let uri = format!("/v1/keys/{}", created.api_key.id());
        let response = send(&app, bearer(get(&uri), &intruder)).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_key_cannot_manage_keys() {
        let app = test_app();
        let created = app
            .api_keys
            .create_key(OwnerId::new("user-3"), "Sync", ApiKeyTier::Basic, None)
            .await
            .unwrap();

        let response = send(&app, with_header(get("/v1/keys"), "x-api-key", &created.secret)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_role_without_key_permission_is_forbidden() {
        let app = test_app();
        app.roles.assign("viewer-1", Role::Public).await;
        let token = app.jwt.issue("viewer-1", None).unwrap();

        let response = send(&app, bearer(get("/v1/keys"), &token)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_create_request() {
        let app = test_app();
        let token = app.jwt.issue("user-5", None).unwrap();

        let bad_tier = bearer(
            json_request("POST", "/v1/keys", serde_json::json!({"name": "x", "tier": "gold"})),
            &token,
        );
        let response = send(&app, bad_tier).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");

        let bad_id = send(&app, bearer(get("/v1/keys/not-a-uuid"), &token)).await;
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_counter_store_failure_fails_closed() {
        use crate::domain::rate_limit::MockRateLimitStore;
        use crate::domain::DomainError;

        let mut store = MockRateLimitStore::new();
        store
            .expect_check_and_increment()
            .returning(|_, _, _| Err(DomainError::unavailable("redis", "connection refused")));
        store.expect_backend().return_const("redis");

        let app = build_app(Arc::new(store), FailurePolicy::Closed, true);
        let response = send(&app, get("/v1/ping")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
        assert!(!body.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_usage_recorded_for_admitted_and_rejected_requests() {
        let app = test_app();

        send(&app, get("/v1/ping")).await;
        send(&app, with_header(get("/v1/ping"), "x-api-key", "bogus")).await;

        let mut entries = Vec::new();
        for _ in 0..50 {
            entries = app.usage.entries().await;
            if entries.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.endpoint == "/v1/ping"));
        assert!(entries.iter().all(|e| e.ip_address == "203.0.113.10"));
        assert!(entries.iter().any(|e| e.status_code == 200));
        assert!(entries.iter().any(|e| e.status_code == 401 && e.error_message.is_some()));
    }
}
