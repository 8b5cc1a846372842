use axum::{
    routing::{get, post},
    Router,
};

pub mod controller;
pub mod error;
pub mod routes;
pub mod validation;

pub fn router() -> Router {
    Router::new()
        .route("/:resource", get(routes::describe))
        .route("/:resource/:id/:relation", get(routes::attached))
        .route("/:resource/:id/:relation/attach", post(routes::attach))
        .route("/:resource/:id/:relation/detach", post(routes::detach))
        .route("/:resource/:id/:relation/sync", post(routes::sync))
}
