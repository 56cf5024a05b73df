/// HTTP routing tests driven through the router with `oneshot`
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use flashcard_graph::{
    config::{CardsConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig},
    context::AppContext,
    db, server,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tower::ServiceExt;

async fn create_app() -> Router {
    let config = ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            table_db: PathBuf::from(":memory:"),
            max_connections: 1,
            call_timeout_ms: 5_000,
        },
        cards: CardsConfig::default(),
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    };
    let pool = db::create_memory_pool().await.unwrap();
    server::build_router(AppContext::with_pool(config, pool))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_and_metrics() {
    let app = create_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, Method::GET, "/health/live", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn fetch_user_requires_identity() {
    let app = create_app().await;

    let (status, body) = send(&app, Method::GET, "/api/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");

    let request = Request::get("/api/me")
        .header("x-authenticated-sub", "user-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "sub": "user-42" }));
}

#[tokio::test]
async fn upsert_fetch_and_delete_card() {
    let app = create_app().await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/cards",
        Some(json!({ "userId": "user1", "sideAText": "front", "labels": ["a"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["userId"], "user1");
    assert_eq!(created["sideAText"], "front");
    assert_eq!(created["labels"], json!(["a"]));
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) =
        send(&app, Method::GET, &format!("/api/users/user1/cards/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, deleted) =
        send(&app, Method::DELETE, &format!("/api/users/user1/cards/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({ "userId": "user1", "id": id }));

    let (status, body) =
        send(&app, Method::GET, &format!("/api/users/user1/cards/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn untested_card_omits_last_test_time() {
    let app = create_app().await;

    let (status, card) = send(
        &app,
        Method::POST,
        "/api/cards",
        Some(json!({ "userId": "user1", "id": "card1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(card.get("lastTestTime").is_none());
}

#[tokio::test]
async fn fetch_cards_dispatches_on_label_and_order() {
    let app = create_app().await;
    for (id, time) in [
        ("c1", "2019-01-03T00:00:00.000Z"),
        ("c2", "2019-01-01T00:00:00.000Z"),
        ("c3", "2019-01-02T00:00:00.000Z"),
    ] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/cards",
            Some(json!({ "userId": "user1", "id": id, "labels": ["deck"], "lastTestTime": time })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let order = |body: &Value| -> Vec<String> {
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap().to_string())
            .collect()
    };

    let (_, by_creation) = send(&app, Method::GET, "/api/users/user1/cards", None).await;
    assert_eq!(order(&by_creation), vec!["c3", "c2", "c1"]);

    let (_, by_label) = send(&app, Method::GET, "/api/users/user1/cards?label=deck", None).await;
    assert_eq!(order(&by_label), vec!["c1", "c2", "c3"]);

    let (_, by_time) = send(
        &app,
        Method::GET,
        "/api/users/user1/cards?label=deck&orderBy=lastTestTime",
        None,
    )
    .await;
    assert_eq!(order(&by_time), vec!["c2", "c3", "c1"]);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users/user1/cards?orderBy=lastTestTime",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/users/user1/cards?cursor=nope!", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidCursor");
}

#[tokio::test]
async fn fetch_cards_pages_with_cursor() {
    let app = create_app().await;
    for id in ["c1", "c2", "c3"] {
        send(
            &app,
            Method::POST,
            "/api/cards",
            Some(json!({ "userId": "user1", "id": id })),
        )
        .await;
    }

    let (_, first) = send(&app, Method::GET, "/api/users/user1/cards?pageSize=2", None).await;
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    let next = first["next"].as_str().unwrap().to_string();

    let (_, second) = send(
        &app,
        Method::GET,
        &format!("/api/users/user1/cards?pageSize=2&cursor={}", next),
        None,
    )
    .await;
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert!(second.get("next").is_none());
}

#[tokio::test]
async fn label_management_routes() {
    let app = create_app().await;
    for id in ["c1", "c2"] {
        send(
            &app,
            Method::POST,
            "/api/cards",
            Some(json!({ "userId": "user1", "id": id, "labels": ["a", "b"] })),
        )
        .await;
    }

    let (status, card) = send(&app, Method::PUT, "/api/users/user1/cards/c1/labels/c", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["labels"], json!(["a", "b", "c"]));

    let (status, _) = send(&app, Method::DELETE, "/api/users/user1/cards/c1/labels/a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::DELETE, "/api/users/user1/labels/b", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);

    let (status, body) = send(&app, Method::DELETE, "/api/users/user1/cards/c2/labels", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    let (_, c1) = send(&app, Method::GET, "/api/users/user1/cards/c1", None).await;
    assert_eq!(c1["labels"], json!(["c"]));

    let (status, _) = send(&app, Method::PUT, "/api/users/user1/cards/missing/labels/a", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn new_practice_deck_returns_cards() {
    let app = create_app().await;
    for (id, label) in [
        ("c1", "frequency-often"),
        ("c2", "frequency-sometimes"),
        ("c3", "frequency-sometimes"),
    ] {
        send(
            &app,
            Method::POST,
            "/api/cards",
            Some(json!({ "userId": "user1", "id": id, "labels": [label] })),
        )
        .await;
    }

    let (status, deck) = send(
        &app,
        Method::POST,
        "/api/practice-decks",
        Some(json!({ "userId": "user1", "pageSize": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let deck = deck.as_array().unwrap();
    assert_eq!(deck.len(), 2);
    assert_eq!(deck[0]["id"], "c1");
    assert_eq!(deck[0]["labels"], json!(["frequency-often", "practice"]));
    assert_eq!(deck[1]["id"], "c2");
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let app = create_app().await;
    let (status, body) = send(&app, Method::GET, "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}
