use std::sync::Arc;

use crate::{
    db::{SqliteStore, StoredLink},
    error::AppError,
    middleware::allowed_ips,
};
use axum::{
    extract::{Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use ipnet::IpNet;
use pushlink::store::TaskId;

/// Commits linked to a task, newest first.
#[tracing::instrument(skip_all, err)]
async fn commits(
    State(store): State<Arc<SqliteStore>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Vec<StoredLink>>, AppError> {
    Ok(Json(store.list_links(task_id).await?))
}

/// Read-only operator routes, restricted to `allowed`.
pub fn router(store: Arc<SqliteStore>, allowed: Vec<IpNet>) -> Router {
    Router::new()
        .route("/api/tasks/{task_id}/commits", get(commits))
        .route_layer(middleware::from_fn_with_state(allowed, allowed_ips))
        .with_state(store)
}
