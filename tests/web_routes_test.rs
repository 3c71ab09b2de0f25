//! Integration tests for web routes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use discourse_comment_sync::render::SummaryFormatter;
use discourse_comment_sync::sync::{
    CountReconciler, ManualClock, MemoryLock, MemoryStore, MetaKey, MetadataStore, SyncGuard,
    SyncPolicy,
};
use discourse_comment_sync::web::{create_app, AppState};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: i64 = 1_700_000_000;

fn create_test_app(store: Arc<MemoryStore>, policy: SyncPolicy) -> Router {
    let guard = SyncGuard::new(
        reqwest::Client::new(),
        store.clone(),
        Arc::new(MemoryLock::new()),
        Arc::new(ManualClock::new(NOW)),
    );
    let policy = Arc::new(policy);
    let state = AppState {
        guard: guard.clone(),
        reconciler: CountReconciler::new(guard, policy.clone()),
        policy,
        formatter: Arc::new(SummaryFormatter::new(store)),
    };
    create_app(state)
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .set(1, MetaKey::Permalink, "https://forum.example.com/t/hello/12")
        .await
        .unwrap();
    store.set(1, MetaKey::PostStatus, "publish").await.unwrap();
    store.set(1, MetaKey::PublishToDiscourse, "1").await.unwrap();
    store.set(1, MetaKey::CommentsCount, "4").await.unwrap();
    store.set(1, MetaKey::NativeCommentCount, "3").await.unwrap();
    store.set(1, MetaKey::LastSync, &NOW.to_string()).await.unwrap();
    store
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(Arc::new(MemoryStore::new()), SyncPolicy::default());
    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn test_comments_renders_markup() {
    let app = create_test_app(seeded_store().await, SyncPolicy::default());
    let response = get(app, "/comments?post_id=1").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("4 replies"));
    assert!(body.contains("https://forum.example.com/t/hello/12"));
}

#[tokio::test]
async fn test_comments_empty_for_bad_post_id() {
    for uri in [
        "/comments",
        "/comments?post_id=",
        "/comments?post_id=abc",
        "/comments?post_id=-1",
        "/comments?post_id=99",
    ] {
        let app = create_test_app(seeded_store().await, SyncPolicy::default());
        let response = get(app, uri).await;

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(body_string(response).await, "", "{uri}");
    }
}

#[tokio::test]
async fn test_comment_count_endpoint() {
    let policy = SyncPolicy {
        show_existing_comments: true,
        ..SyncPolicy::default()
    };
    let app = create_test_app(seeded_store().await, policy);
    let response = get(app, "/api/comment-count?post_id=1&context=single").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["post_id"], 1);
    assert_eq!(json["count"], 7);
}

#[tokio::test]
async fn test_comment_count_rejects_bad_post_id() {
    let app = create_test_app(seeded_store().await, SyncPolicy::default());
    let response = get(app, "/api/comment-count?post_id=nope").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_flags_and_syncs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/hello/12/wordpress.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"posts_count": 10}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store().await;
    store
        .set(1, MetaKey::Permalink, &format!("{}/t/hello/12", server.uri()))
        .await
        .unwrap();

    let policy = SyncPolicy {
        webhook_mode: true,
        ..SyncPolicy::default()
    };
    let app = create_test_app(store.clone(), policy);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/posts/1")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["outcome"], "updated");
    assert_eq!(
        store.get(1, MetaKey::CommentsCount).await.unwrap().as_deref(),
        Some("9")
    );
    assert_eq!(
        store.get(1, MetaKey::SyncPending).await.unwrap().as_deref(),
        Some("0")
    );
}
