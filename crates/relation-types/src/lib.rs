use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl Default for StatusResponse {
    fn default() -> Self {
        Self {
            status: STATUS_OK.into(),
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    /// Field-level validation messages, keyed by request parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.into(),
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: BTreeMap<String, Vec<String>>) -> Self {
        self.errors = Some(errors);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PaginationMeta {
    pub current_page: u64,
    pub per_page: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub path: String,
    pub first_page_url: String,
    pub next_page_url: Option<String>,
    pub prev_page_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse {
    pub status: String,
    /// Related rows, each carrying a `pivot` object with both pivot keys.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<serde_json::Value>,
    pub meta: PaginationMeta,
}

/// Request body for attach, detach and sync: an array of related ids under
/// the parameter key (the relation name unless overridden).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemSetRequest(#[schema(value_type = Object)] pub BTreeMap<String, serde_json::Value>);

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RelationSummary {
    pub accessor: String,
    pub kind: String,
    pub related: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DescribeResourceResponse {
    pub resource: String,
    pub table: String,
    pub relations: Vec<RelationSummary>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ResourcePathParams {
    /// Configured resource name, e.g. `users`.
    pub resource: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RelationPathParams {
    pub resource: String,
    /// Owner id. Ids that do not parse as integers are reported as not found.
    pub id: String,
    /// Relation accessor; hyphenated names are camel-cased when no literal
    /// accessor exists.
    pub relation: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ParamKeyQuery {
    /// Body key holding the item set. Defaults to the relation name.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u64>,
}
