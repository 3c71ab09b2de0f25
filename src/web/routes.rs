use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::sync::{PostId, ViewContext};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(comments))
        .route("/api/comment-count", get(comment_count))
        .route("/webhook/posts/:post_id", post(webhook))
        .route("/healthz", get(health))
}

/// Parse a post ID from a query parameter. Only positive integers are valid.
fn parse_post_id(raw: Option<&str>) -> Option<PostId> {
    raw.and_then(|s| s.trim().parse::<PostId>().ok())
        .filter(|id| *id > 0)
}

#[derive(Debug, Deserialize)]
pub struct CommentsParams {
    post_id: Option<String>,
}

/// Rendered comment block. Empty for a missing or invalid post ID.
async fn comments(State(state): State<AppState>, Query(params): Query<CommentsParams>) -> Response {
    let Some(post_id) = parse_post_id(params.post_id.as_deref()) else {
        return Html(String::new()).into_response();
    };

    match state.formatter.format(post_id).await {
        Ok(markup) => Html(markup).into_response(),
        Err(e) => {
            tracing::error!(post_id, "Failed to format comments: {e:#}");
            Html(String::new()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    post_id: Option<String>,
    #[serde(default)]
    context: ViewContext,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    post_id: PostId,
    count: i64,
}

async fn comment_count(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Response {
    let Some(post_id) = parse_post_id(params.post_id.as_deref()) else {
        return (StatusCode::BAD_REQUEST, "Invalid post_id").into_response();
    };

    let count = state.reconciler.resolve_count(post_id, params.context).await;
    Json(CountResponse { post_id, count }).into_response()
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    post_id: PostId,
    outcome: &'static str,
}

/// Flag a post as changed upstream and try to sync it straight away.
///
/// The request body is ignored.
async fn webhook(State(state): State<AppState>, Path(post_id): Path<PostId>) -> Response {
    if post_id <= 0 {
        return (StatusCode::BAD_REQUEST, "Invalid post_id").into_response();
    }

    let outcome = state.guard.notify(post_id, &state.policy).await;
    tracing::info!(post_id, outcome = outcome.as_str(), "Webhook sync requested");

    (
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            post_id,
            outcome: outcome.as_str(),
        }),
    )
        .into_response()
}

async fn health() -> &'static str {
    "OK"
}
