pub mod health;
pub mod jobs;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /capabilities/{kind}/jobs        submit (POST)
///
/// /jobs                            list own jobs (GET)
/// /jobs/{id}                       status (GET)
/// /jobs/{id}/cancel                cancel (POST)
/// /jobs/{id}/result                completed artifact (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/capabilities/{kind}/jobs",
            post(handlers::jobs::submit_job),
        )
        .nest("/jobs", jobs::router())
}
