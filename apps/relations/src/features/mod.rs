use crate::AppState;
use axum::{routing::get, Extension, Json, Router};
use relation_types::StatusResponse;

pub mod attachable;
pub mod models;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", attachable::router())
        .layer(Extension(state))
}

async fn healthz() -> Json<StatusResponse> {
    Json(StatusResponse::default())
}
