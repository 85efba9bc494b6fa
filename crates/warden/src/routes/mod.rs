//! HTTP routes for Warden.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use warden_common::BreakerState;

use crate::directory::MembershipDirectory;
use crate::state::AppState;

mod events;
mod health;

/// Create the main application router
pub fn create_router<D: MembershipDirectory>(state: AppState<D>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check::<D>))
        .route("/metrics", get(health::metrics::<D>))

        // Host event ingress
        .route("/events/member-joined", post(events::member_joined::<D>))
        .route("/events/member-left", post(events::member_left::<D>))
        .route("/events/reply", post(events::reply::<D>))

        // Operator endpoints
        .nest("/admin", admin_routes::<D>())

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Admin routes (breaker status, manual sweep)
fn admin_routes<D: MembershipDirectory>() -> Router<AppState<D>> {
    Router::new()
        .route("/breaker", get(get_breaker::<D>))
        .route("/regularize", post(run_regularize::<D>))
}

// === Admin Handlers ===

#[derive(Serialize)]
struct BreakerResponse {
    #[serde(flatten)]
    state: BreakerState,
    window_size: usize,
    punishment_history: usize,
}

async fn get_breaker<D: MembershipDirectory>(State(state): State<AppState<D>>) -> Json<BreakerResponse> {
    let stats = state.gate.get_stats().await;
    Json(BreakerResponse {
        state: stats.breaker,
        window_size: stats.window_size,
        punishment_history: stats.punishment_history,
    })
}

#[derive(Serialize)]
struct RegularizeResponse {
    promoted: usize,
}

async fn run_regularize<D: MembershipDirectory>(State(state): State<AppState<D>>) -> Json<RegularizeResponse> {
    let promoted = state.gate.regularize().await;
    tracing::info!(promoted, "Manual regularization sweep");
    Json(RegularizeResponse { promoted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::gate::testing::{directory, gate_with};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn app() -> Router {
        let gate = gate_with(test_config(), directory(), &["AB23CD"]);
        create_router(AppState::new(gate))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_requires_start() {
        let gate = gate_with(test_config(), directory(), &["AB23CD"]);
        let state = AppState::new(gate.clone());

        let (status, _) = call(create_router(state.clone()), Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        tokio_test::assert_ok!(gate.start().await);
        let (status, body) = call(create_router(state), Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_event_opens_challenge() {
        let now = Utc::now();
        let (status, body) = call(
            app(),
            post_json(
                "/events/member-joined",
                json!({
                    "id": 42,
                    "display_name": "newcomer_42",
                    "account_created": now - ChronoDuration::days(90),
                    "joined_at": now,
                    "has_avatar": true,
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member"], 42);
        assert_eq!(body["result"]["status"], "pending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_event_rejects_bad_candidate() {
        let now = Utc::now();
        let (status, _) = call(
            app(),
            post_json(
                "/events/member-joined",
                json!({
                    "id": 0,
                    "display_name": "nobody",
                    "account_created": now,
                    "joined_at": now,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_reply_is_accepted_and_ignored() {
        let (status, _) = call(
            app(),
            post_json("/events/reply", json!({"thread": 9, "author": 1, "content": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = call(app(), post_json("/events/member-left", json!({"member": 1}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_and_metrics() {
        let (status, body) = call(app(), Request::get("/admin/breaker").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "closed");
        assert_eq!(body["window_size"], 0);

        let (status, body) = call(app(), Request::get("/metrics").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["live_sessions"], 0);
        assert_eq!(body["challenge_pool"]["pool_capacity"], 0);
    }
}
