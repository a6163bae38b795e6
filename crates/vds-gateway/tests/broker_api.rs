//! End-to-end tests of the broker API over the full router.
//!
//! The backends are the in-memory directory and hypervisor from the
//! `test-utils` features, installed through the same bootstrap as the binary.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use vds_auth::{StaticDirectory, TokenService};
use vds_gateway::{bootstrap, create_router, BrokerConfig, Mode};
use vds_hypervisor::{Credentials, FakeVm, InMemoryHypervisor, PowerState, SessionGuard};

const XAPI_PASSWORD: &str = "xapi-pass";

fn config() -> BrokerConfig {
    BrokerConfig {
        directory_domain: "corp.example.com".to_string(),
        hypervisor_credentials: Credentials::new("root", XAPI_PASSWORD),
        ..BrokerConfig::default()
    }
}

fn hypervisor(password: &str) -> InMemoryHypervisor {
    InMemoryHypervisor::new(Credentials::new("root", password))
        .with_vm(FakeVm::new("abc", "Alice desktop", "alice").with_metrics("10.0.0.11", "centos"))
        .with_vm(
            FakeVm::new("def", "Bob desktop", "bob")
                .with_power_state(PowerState::Running)
                .with_metrics("10.0.0.20", "ubuntu"),
        )
}

struct Broker {
    server: TestServer,
    tokens: Arc<TokenService>,
    guard: Arc<SessionGuard<InMemoryHypervisor>>,
}

async fn broker_with(hypervisor: InMemoryHypervisor) -> Broker {
    let config = config();
    let tokens = Arc::new(TokenService::new(&[42u8; 32]));
    let guard = Arc::new(SessionGuard::new(hypervisor));

    let table = bootstrap::install(
        &config,
        |_| StaticDirectory::new().with_user("alice", "wonderland"),
        Arc::clone(&guard),
        Arc::clone(&tokens),
    )
    .await;

    let app = create_router(table, Arc::clone(&tokens), &config.gateway);
    Broker {
        server: TestServer::new(app).unwrap(),
        tokens,
        guard,
    }
}

async fn live_broker() -> Broker {
    broker_with(hypervisor(XAPI_PASSWORD)).await
}

async fn failsafe_broker() -> Broker {
    broker_with(hypervisor("wrong-pass")).await
}

// =============================================================================
// Login and connect
// =============================================================================

#[tokio::test]
async fn login_then_connect() {
    let broker = live_broker().await;

    let response = broker
        .server
        .post("/v1/login")
        .json(&json!({ "username": "alice", "password": "wonderland" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(
        body["vms"],
        json!({
            "abc": {
                "name": "Alice desktop",
                "status": "Halted",
                "public_ip": "10.0.0.11",
                "os": "centos",
            }
        })
    );
    let token = body["token"].as_str().unwrap().to_string();

    let response = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "abc", "token": token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({ "abc": { "rdp_ip": "10.0.0.11", "rdp_port": 3389 } })
    );
    assert_eq!(
        broker.guard.client().power_state("abc"),
        Some(PowerState::Running)
    );
}

#[tokio::test]
async fn conn_alias_reaches_connect() {
    let broker = live_broker().await;
    let token = broker.tokens.issue("alice");

    let response = broker
        .server
        .post("/v1/conn")
        .json(&json!({ "vm_id": "abc", "token": token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn login_with_bad_password_is_unauthorized() {
    let broker = live_broker().await;

    let response = broker
        .server
        .post("/v1/login")
        .json(&json!({ "username": "alice", "password": "looking-glass" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.json::<Value>(),
        json!({ "err": "Invalid username or password" })
    );
}

#[tokio::test]
async fn connect_to_someone_elses_desktop_is_unauthorized() {
    let broker = live_broker().await;
    let token = broker.tokens.issue("alice");

    let response = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "def", "token": token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Tokens
// =============================================================================

#[tokio::test]
async fn expired_token_is_rejected() {
    let broker = live_broker().await;
    let token = broker
        .tokens
        .issue_at("alice", Utc::now() - Duration::days(2));

    let response = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "abc", "token": token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>(), json!({ "err": "Invalid token" }));
    assert_eq!(
        broker.guard.client().power_state("abc"),
        Some(PowerState::Halted)
    );
}

#[tokio::test]
async fn missing_token_looks_like_invalid_token() {
    let broker = live_broker().await;

    let missing = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "abc" }))
        .await;
    let invalid = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "abc", "token": "not-a-token" }))
        .await;

    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(missing.status_code(), invalid.status_code());
    assert_eq!(missing.text(), invalid.text());
}

#[tokio::test]
async fn token_from_another_key_is_rejected() {
    let broker = live_broker().await;
    let token = TokenService::new(&[1u8; 32]).issue("alice");

    let response = broker
        .server
        .post("/v1/connect")
        .json(&json!({ "vm_id": "abc", "token": token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Exempt routes
// =============================================================================

#[tokio::test]
async fn heartbeat_needs_no_token_or_body() {
    let broker = live_broker().await;

    let response = broker.server.post("/v1/heartbeat").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    assert!(response.text().is_empty());

    let response = broker.server.get("/v1/heartbeat").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn settings_needs_no_token() {
    let broker = live_broker().await;

    let response = broker
        .server
        .post("/v1/settings")
        .json(&json!({ "query": ["otp"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "otp": false }));
}

// =============================================================================
// Request validation
// =============================================================================

#[tokio::test]
async fn malformed_json_has_its_own_status() {
    let broker = live_broker().await;

    let response = broker
        .server
        .post("/v1/login")
        .content_type("application/json")
        .bytes("{\"username\": \"alice\",".into())
        .await;
    assert_eq!(response.status_code().as_u16(), 753);
    assert_ne!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_ne!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn wrong_content_type_is_rejected() {
    let broker = live_broker().await;

    let response = broker
        .server
        .post("/v1/login")
        .text("username=alice&password=wonderland")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let broker = live_broker().await;

    let response = broker.server.post("/v1/logout").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = broker.server.post("/login").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_is_not_allowed() {
    let broker = live_broker().await;

    let response = broker.server.get("/v1/login").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

// =============================================================================
// Failsafe
// =============================================================================

#[tokio::test]
async fn failsafe_answers_every_route_the_same() {
    let broker = failsafe_broker().await;
    assert!(!broker.guard.is_ready());

    let expected = json!({ "err": "Out of service" });
    for path in ["/v1/login", "/v1/connect", "/v1/conn", "/v1/settings", "/v1/heartbeat"] {
        let response = broker
            .server
            .post(path)
            .json(&json!({ "username": "alice", "password": "wonderland" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE, "{path}");
        assert_eq!(response.json::<Value>(), expected, "{path}");

        let response = broker
            .server
            .post(path)
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE, "{path}");
        assert_eq!(response.json::<Value>(), expected, "{path}");

        let response = broker.server.get(path).await;
        assert_eq!(response.json::<Value>(), expected, "{path}");
    }
}

#[tokio::test]
async fn failsafe_when_hypervisor_is_unreachable() {
    let broker = broker_with(InMemoryHypervisor::offline()).await;

    let response = broker
        .server
        .post("/v1/login")
        .json(&json!({ "username": "alice", "password": "wonderland" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.json::<Value>(),
        json!({ "err": "Out of service" })
    );
}

#[tokio::test]
async fn live_mode_is_reported() {
    let config = config();
    let tokens = Arc::new(TokenService::generate());
    let guard = Arc::new(SessionGuard::new(hypervisor(XAPI_PASSWORD)));

    let table = bootstrap::install(&config, |_| StaticDirectory::new(), guard, tokens).await;
    assert_eq!(table.mode(), Mode::Live);
}
