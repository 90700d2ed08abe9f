use crate::{app_state::AppState, rate_limit::Admission, search};

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;

/// Every request goes through admission control before reaching a handler
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/nearest-station", get(search::nearest_station))
        .layer(middleware::from_fn_with_state(state.clone(), admission))
        .with_state(state)
}

async fn admission(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let client = state.client_identity.identify(&request);

    match state.rate_limiter.admit(&client) {
        Admission::Allowed => next.run(request).await,
        Admission::Rejected { retry_after } => {
            tracing::warn!(%client, "rate limit exceeded");

            // round up so clients don't come back a moment too early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, secs.max(1).to_string())],
                Json(json!({ "error": "Rate limit exceeded. Try again later." })),
            )
                .into_response()
        }
    }
}
