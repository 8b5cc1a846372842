use crate::features::attachable::controller::{Attachable, ResourceController};
use crate::features::attachable::error::AttachError;
use crate::features::attachable::validation::parse_body;
use crate::features::models::relation::SimplePage;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query},
    Extension, Json,
};
use relation_types::{
    DescribeResourceResponse, ErrorResponse, ItemSetRequest, PageQuery, PaginatedResponse,
    PaginationMeta, ParamKeyQuery, RelationPathParams, RelationSummary, ResourcePathParams,
    StatusResponse, STATUS_OK,
};

fn controller_for(st: &AppState, resource: &str) -> Result<ResourceController, AttachError> {
    st.controller(resource).ok_or(AttachError::NotFound)
}

fn pagination_meta(path: String, page: &SimplePage) -> PaginationMeta {
    let count = page.items.len() as u64;
    let from = (count > 0).then(|| (page.current_page - 1) * page.per_page + 1);
    let to = from.map(|first| first + count - 1);
    PaginationMeta {
        current_page: page.current_page,
        per_page: page.per_page,
        from,
        to,
        first_page_url: format!("{path}?page=1"),
        next_page_url: page
            .has_more
            .then(|| format!("{path}?page={}", page.current_page + 1)),
        prev_page_url: (page.current_page > 1)
            .then(|| format!("{path}?page={}", page.current_page - 1)),
        path,
    }
}

#[utoipa::path(
    get,
    path = "/v1/{resource}",
    params(ResourcePathParams),
    responses(
        (status = 200, description = "Relation accessors of the resource", body = DescribeResourceResponse),
        (status = 404, description = "Unknown resource", body = ErrorResponse),
    ),
    tag = "Relations"
)]
pub async fn describe(
    Extension(st): Extension<AppState>,
    Path(ResourcePathParams { resource }): Path<ResourcePathParams>,
) -> Result<Json<DescribeResourceResponse>, AttachError> {
    let model = st.registry.get(&resource).ok_or(AttachError::NotFound)?;
    let relations = model
        .relations
        .iter()
        .map(|(accessor, relation)| RelationSummary {
            accessor: accessor.clone(),
            kind: relation.kind().into(),
            related: relation.related().into(),
        })
        .collect();
    Ok(Json(DescribeResourceResponse {
        resource,
        table: model.table.clone(),
        relations,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/{resource}/{id}/{relation}",
    params(RelationPathParams, PageQuery),
    responses(
        (status = 200, description = "Page of related items", body = PaginatedResponse),
        (status = 404, description = "Owner, resource or relation not found", body = ErrorResponse),
        (status = 500, description = "Failed to list related items", body = ErrorResponse),
    ),
    tag = "Relations"
)]
pub async fn attached(
    Extension(st): Extension<AppState>,
    Path(RelationPathParams {
        resource,
        id,
        relation,
    }): Path<RelationPathParams>,
    Query(PageQuery { page }): Query<PageQuery>,
) -> Result<Json<PaginatedResponse>, AttachError> {
    let controller = controller_for(&st, &resource)?;
    let page = controller
        .attached(&id, &relation, page.unwrap_or(1))
        .await?;
    let meta = pagination_meta(format!("/v1/{resource}/{id}/{relation}"), &page);
    Ok(Json(PaginatedResponse {
        status: STATUS_OK.into(),
        data: page.items,
        meta,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/{resource}/{id}/{relation}/attach",
    params(RelationPathParams, ParamKeyQuery),
    request_body = ItemSetRequest,
    responses(
        (status = 200, description = "Items attached", body = StatusResponse),
        (status = 404, description = "Owner or resource not found", body = ErrorResponse),
        (status = 422, description = "Item set missing or not an array", body = ErrorResponse),
        (status = 500, description = "Relation operation failed", body = ErrorResponse),
    ),
    tag = "Relations"
)]
pub async fn attach(
    Extension(st): Extension<AppState>,
    Path(RelationPathParams {
        resource,
        id,
        relation,
    }): Path<RelationPathParams>,
    Query(ParamKeyQuery { key }): Query<ParamKeyQuery>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AttachError> {
    let controller = controller_for(&st, &resource)?;
    let body = parse_body(&body);
    let resp = controller
        .attach(&id, &relation, &body, key.as_deref())
        .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/v1/{resource}/{id}/{relation}/detach",
    params(RelationPathParams, ParamKeyQuery),
    request_body = ItemSetRequest,
    responses(
        (status = 200, description = "Items detached", body = StatusResponse),
        (status = 404, description = "Owner or resource not found", body = ErrorResponse),
        (status = 422, description = "Item set missing or not an array", body = ErrorResponse),
        (status = 500, description = "Relation operation failed", body = ErrorResponse),
    ),
    tag = "Relations"
)]
pub async fn detach(
    Extension(st): Extension<AppState>,
    Path(RelationPathParams {
        resource,
        id,
        relation,
    }): Path<RelationPathParams>,
    Query(ParamKeyQuery { key }): Query<ParamKeyQuery>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AttachError> {
    let controller = controller_for(&st, &resource)?;
    let body = parse_body(&body);
    let resp = controller
        .detach(&id, &relation, &body, key.as_deref())
        .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/v1/{resource}/{id}/{relation}/sync",
    params(RelationPathParams, ParamKeyQuery),
    request_body = ItemSetRequest,
    responses(
        (status = 200, description = "Membership replaced", body = StatusResponse),
        (status = 404, description = "Owner or resource not found", body = ErrorResponse),
        (status = 422, description = "Item set missing or not an array", body = ErrorResponse),
        (status = 500, description = "Relation operation failed", body = ErrorResponse),
    ),
    tag = "Relations"
)]
pub async fn sync(
    Extension(st): Extension<AppState>,
    Path(RelationPathParams {
        resource,
        id,
        relation,
    }): Path<RelationPathParams>,
    Query(ParamKeyQuery { key }): Query<ParamKeyQuery>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AttachError> {
    let controller = controller_for(&st, &resource)?;
    let body = parse_body(&body);
    let resp = controller
        .sync(&id, &relation, &body, key.as_deref())
        .await?;
    Ok(Json(resp))
}
