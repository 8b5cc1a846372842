use axum::{routing::get, Json, Router};
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::attachable::routes::describe,
        crate::features::attachable::routes::attached,
        crate::features::attachable::routes::attach,
        crate::features::attachable::routes::detach,
        crate::features::attachable::routes::sync,
    ),
    components(
        schemas(
            relation_types::StatusResponse,
            relation_types::ErrorResponse,
            relation_types::PaginatedResponse,
            relation_types::PaginationMeta,
            relation_types::ItemSetRequest,
            relation_types::DescribeResourceResponse,
            relation_types::RelationSummary,
        )
    ),
    tags(
        (name = "Relations", description = "Attach, detach and sync many-to-many relations."),
    )
)]
pub struct ApiDoc;

pub fn router(openapi: OpenApiDoc) -> Router {
    let spec = openapi.clone();
    Router::new()
        .route(
            "/docs/openapi.json",
            get(move || {
                let spec = spec.clone();
                async move { Json(spec) }
            }),
        )
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi))
}

pub async fn write_openapi_yaml(openapi: &OpenApiDoc) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(openapi)?;
    tokio::fs::create_dir_all("openapi/relations").await?;
    tokio::fs::write("openapi/relations/openapi.yaml", yaml).await?;
    Ok(())
}
