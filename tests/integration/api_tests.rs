//! API integration tests (router driven in-process)

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use circulation_server::{
    api,
    config::AppConfig,
    models::{Claims, NewMember, NewTitle, Role},
    repository::{memory::Seed, MemoryStore, Repository},
    services::Services,
    AppState,
};

/// Router over a seeded memory store: title 1 has a single copy, title 2 has five
async fn test_app() -> (Router, String) {
    let config = AppConfig::default();
    let secret = config.auth.jwt_secret.clone();

    let store = MemoryStore::new();
    store
        .seed(Seed {
            titles: vec![
                NewTitle {
                    name: "Principles of Economics".to_string(),
                    author: Some("N. Gregory Mankiw".to_string()),
                    total_copies: 1,
                    is_active: true,
                },
                NewTitle {
                    name: "Engineering Mathematics".to_string(),
                    author: Some("K. A. Stroud".to_string()),
                    total_copies: 5,
                    is_active: true,
                },
            ],
            members: vec![
                NewMember {
                    external_id: "CS2021001".to_string(),
                    name: "Aarav Sharma".to_string(),
                    is_active: true,
                },
                NewMember {
                    external_id: "EE2021014".to_string(),
                    name: "Meera Iyer".to_string(),
                    is_active: true,
                },
            ],
        })
        .await
        .unwrap();

    let repository = Repository::new(Arc::new(store), config.circulation.store_timeout());
    let services = Services::new(repository, &config.circulation);
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    (api::router(state), secret)
}

fn token(secret: &str, role: Role, member_id: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    Claims {
        sub: format!("{:?}-principal", role).to_lowercase(),
        role,
        member_id: member_id.map(str::to_string),
        exp: now + 3600,
        iat: now,
    }
    .create_token(secret)
    .unwrap()
}

fn librarian(secret: &str) -> String {
    token(secret, Role::Librarian, None)
}

fn member(secret: &str, external_id: &str) -> String {
    token(secret, Role::Member, Some(external_id))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&String>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn issue_body(title_id: i64, member_id: &str) -> Value {
    json!({
        "title_id": title_id,
        "member_id": member_id,
        "due_date": (Utc::now() + Duration::days(14)).to_rfc3339(),
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/loans"].is_object());
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let (app, _) = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        None,
        Some(issue_body(1, "CS2021001")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);

    let forged = token("another-secret", Role::Librarian, None);
    let (status, _) = send(&app, Method::GET, "/api/v1/loans", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_issue_and_return_flow() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);

    let (status, loan) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(1, "CS2021001")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "active");
    assert_eq!(loan["title_id"], 1);
    assert!(loan.get("return_date").is_none());
    let loan_id = loan["id"].as_i64().unwrap();

    let (status, title) = send(&app, Method::GET, "/api/v1/titles/1", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(title["available_copies"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(1, "EE2021014")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 15);

    let uri = format!("/api/v1/loans/{}/return", loan_id);
    let (status, returned) = send(&app, Method::POST, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");
    assert!(returned["return_date"].is_string());

    let (status, body) = send(&app, Method::POST, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 21);

    let (status, body) = send(&app, Method::POST, "/api/v1/loans/999/return", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 20);
}

#[tokio::test]
async fn test_unknown_loan_has_one_error_code_on_read_and_return() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);

    let (status, read) = send(&app, Method::GET, "/api/v1/loans/999", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, ret) = send(&app, Method::POST, "/api/v1/loans/999/return", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(read["code"], 20);
    assert_eq!(read["code"], ret["code"]);
}

#[tokio::test]
async fn test_huge_page_is_a_validation_error() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);

    let uri = format!("/api/v1/loans?page={}", i64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let uri = format!("/api/v1/loans?page={}&per_page=1", i64::MAX / 100);
    let (status, body) = send(&app, Method::GET, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
}

#[tokio::test]
async fn test_issue_error_codes() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);

    let past = json!({
        "title_id": 2,
        "member_id": "CS2021001",
        "due_date": (Utc::now() - Duration::days(1)).to_rfc3339(),
    });
    let (status, body) = send(&app, Method::POST, "/api/v1/loans", Some(&librarian), Some(past)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(2, "")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(42, "CS2021001")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 10);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(2, "XX0000000")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 12);

    for _ in 0..3 {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/loans",
            Some(&librarian),
            Some(issue_body(2, "CS2021001")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(2, "CS2021001")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 14);
}

#[tokio::test]
async fn test_members_only_see_their_own_loans() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);
    let aarav = member(&secret, "CS2021001");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&aarav),
        Some(issue_body(2, "CS2021001")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    send(&app, Method::POST, "/api/v1/loans", Some(&librarian), Some(issue_body(2, "CS2021001"))).await;
    let (_, other) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(&librarian),
        Some(issue_body(2, "EE2021014")),
    )
    .await;

    let (status, page) = send(&app, Method::GET, "/api/v1/loans", Some(&aarav), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, page) = send(&app, Method::GET, "/api/v1/loans?per_page=1", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["total_pages"], 2);

    let (status, _) = send(&app, Method::GET, "/api/v1/loans?member=EE2021014", Some(&aarav), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/v1/loans/{}", other["id"]);
    let (status, _) = send(&app, Method::GET, &uri, Some(&aarav), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, loan) = send(&app, Method::GET, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loan["id"], other["id"]);

    let (status, open) = send(
        &app,
        Method::GET,
        "/api/v1/members/CS2021001/open-loans",
        Some(&aarav),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open["loan_ids"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/members/EE2021014/open-loans",
        Some(&aarav),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_librarian_maintenance_endpoints() {
    let (app, secret) = test_app().await;
    let librarian = librarian(&secret);
    let aarav = member(&secret, "CS2021001");

    send(&app, Method::POST, "/api/v1/loans", Some(&librarian), Some(issue_body(2, "CS2021001"))).await;
    send(&app, Method::POST, "/api/v1/loans", Some(&librarian), Some(issue_body(2, "EE2021014"))).await;

    let (status, _) = send(&app, Method::GET, "/api/v1/stats", Some(&aarav), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = send(&app, Method::GET, "/api/v1/stats", Some(&librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["active_count"], 2);
    assert_eq!(stats["overdue_count"], 0);
    assert_eq!(stats["total_active_titles"], 2);
    assert_eq!(stats["total_active_members"], 2);
    assert_eq!(stats["top_borrowed"][0]["title_id"], 2);
    assert_eq!(stats["top_borrowed"][0]["count"], 2);

    let (status, refreshed) = send(
        &app,
        Method::POST,
        "/api/v1/loans/refresh-overdue",
        Some(&librarian),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["updated"], 0);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/titles/2/copies",
        Some(&librarian),
        Some(json!({ "total_copies": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 30);

    let (status, title) = send(
        &app,
        Method::PUT,
        "/api/v1/titles/2/copies",
        Some(&librarian),
        Some(json!({ "total_copies": 8 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(title["total_copies"], 8);
    assert_eq!(title["available_copies"], 6);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/titles/2/copies",
        Some(&aarav),
        Some(json!({ "total_copies": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
