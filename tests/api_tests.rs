use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use newsletter_recs::{
    config::Config,
    db::{ExperimentStore, MemoryStore},
    models::{Cadence, ContentDepth, Experiment, Newsletter, UserProfile, Variant},
    routes::create_router,
    services::{Engine, Stores},
    state::AppState,
};

fn create_test_app(store: &MemoryStore) -> Router {
    let engine = Engine::new(Stores::shared(store.clone()), None, &Config::default());
    create_router(AppState::new(engine))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn seed_catalog(store: &MemoryStore) -> Vec<Newsletter> {
    let items = vec![
        Newsletter::new("AI Weekly", ContentDepth::Deep, Cadence::Weekly)
            .with_categories(["Technology"])
            .with_subscribers(120_000),
        Newsletter::new("Morning Markets", ContentDepth::Quick, Cadence::Daily)
            .with_categories(["Finance"])
            .with_subscribers(60_000),
        Newsletter::new("Design Notes", ContentDepth::Quick, Cadence::Weekly)
            .with_categories(["Design"])
            .with_subscribers(5_000),
        Newsletter::new("Long Reads", ContentDepth::Deep, Cadence::Monthly)
            .with_categories(["Culture"])
            .with_subscribers(30_000),
    ];
    for item in &items {
        store.insert_item(item.clone()).await;
    }
    items
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(&MemoryStore::new());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_anonymous_recommendations_are_fallback() {
    let store = MemoryStore::new();
    seed_catalog(&store).await;

    let (status, body) = send(
        create_test_app(&store),
        post_json("/api/v1/recommendations", None, json!({ "limit": 5 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 3);
    assert!(recs.iter().all(|r| r["score"] == 0.7));
}

#[tokio::test]
async fn test_personalized_recommendations() {
    let store = MemoryStore::new();
    seed_catalog(&store).await;
    let user = Uuid::new_v4();
    let mut profile = UserProfile::empty(user);
    profile.categories = vec!["finance".to_string()];
    store.insert_profile(profile).await;

    let (status, body) = send(
        create_test_app(&store),
        post_json("/api/v1/recommendations", Some(user), json!({ "limit": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0]["item"]["title"], "Morning Markets");
    assert_eq!(recs[0]["variant"], "baseline");
}

#[tokio::test]
async fn test_malformed_user_header_is_rejected() {
    let store = MemoryStore::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/recommendations")
        .header("content-type", "application/json")
        .header("x-user-id", "someone")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(create_test_app(&store), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_record_interaction() {
    let store = MemoryStore::new();
    let items = seed_catalog(&store).await;
    let user = Uuid::new_v4();

    let (status, body) = send(
        create_test_app(&store),
        post_json(
            "/api/v1/interactions",
            Some(user),
            json!({ "item_id": items[0].id, "interaction_type": "subscribe" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].as_str().and_then(|s| Uuid::parse_str(s).ok()).is_some());
}

#[tokio::test]
async fn test_record_interaction_requires_user() {
    let store = MemoryStore::new();

    let (status, _) = send(
        create_test_app(&store),
        post_json(
            "/api/v1/interactions",
            None,
            json!({ "item_id": Uuid::new_v4(), "interaction_type": "view" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_assignment_is_stable() {
    let store = MemoryStore::new();
    let experiment = Experiment::new(
        "ranking",
        vec![
            Variant::new("baseline", 1.0, "hybrid"),
            Variant::new("popularity", 1.0, "subscriber count"),
        ],
    );
    store.put(&experiment).await.unwrap();
    let user = Uuid::new_v4();
    let uri = format!("/api/v1/experiments/{}/assignment", experiment.id);

    let (status, first) = send(create_test_app(&store), post_json(&uri, Some(user), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(create_test_app(&store), post_json(&uri, Some(user), json!({}))).await;

    assert_eq!(first["variant"], second["variant"]);
    assert_eq!(store.assignment_count(experiment.id).await, 1);
}

#[tokio::test]
async fn test_assignment_unknown_experiment() {
    let uri = format!("/api/v1/experiments/{}/assignment", Uuid::new_v4());

    let (status, body) = send(
        create_test_app(&MemoryStore::new()),
        post_json(&uri, Some(Uuid::new_v4()), json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_conclude_experiment() {
    let store = MemoryStore::new();
    let mut a = Variant::new("A", 2.0, "");
    a.metrics.click_through_rate = 0.5;
    let mut b = Variant::new("B", 1.0, "");
    b.metrics.click_through_rate = 0.9;
    let experiment = Experiment::new("headline", vec![a, b]);
    store.put(&experiment).await.unwrap();

    let uri = format!("/api/v1/experiments/{}/conclude", experiment.id);
    let (status, body) = send(create_test_app(&store), post_json(&uri, None, json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winner"], "A");
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_conclude_without_body() {
    let store = MemoryStore::new();
    let experiment = Experiment::new("subject-line", vec![Variant::new("A", 1.0, "")]);
    store.put(&experiment).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/experiments/{}/conclude", experiment.id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(create_test_app(&store), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["winner"], "A");
}

#[tokio::test]
async fn test_performance_for_empty_range() {
    let request = Request::builder()
        .uri("/api/v1/insights/performance?start=2024-01-01&end=2024-01-31")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(create_test_app(&MemoryStore::new()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_recommendations"], 0);
    assert_eq!(body["positive_interaction_rate"], 0.0);
    assert_eq!(body["top_variants"], json!([]));
}

#[tokio::test]
async fn test_performance_rejects_inverted_range() {
    let request = Request::builder()
        .uri("/api/v1/insights/performance?start=2024-02-01&end=2024-01-01")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(create_test_app(&MemoryStore::new()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
