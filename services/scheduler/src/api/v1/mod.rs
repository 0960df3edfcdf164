//! API v1 routes.

mod ingest;
mod plans;
mod pods;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes. Ingestion endpoints are only mounted in dev mode.
pub fn routes(dev_mode: bool) -> Router<AppState> {
    let router = Router::new()
        .nest("/plans", plans::routes())
        .nest("/pods", pods::routes());
    if dev_mode {
        router.merge(ingest::routes())
    } else {
        router
    }
}
