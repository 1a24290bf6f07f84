//! MCP tool request types.
//!
//! These structs define the arguments for each registry operation. Their
//! JSON Schemas are what `tools/list` advertises. They are serialized again
//! when handed to the operation catalog.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of search hits returned.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Default number of versions returned, newest first.
pub const DEFAULT_VERSIONS_LIMIT: usize = 20;
/// Upper bound accepted for any `limit` argument.
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PackageRequest {
    #[schemars(
        description = "Exact package name as published (npm scoped names like @scope/name are accepted)"
    )]
    #[serde(alias = "package", alias = "crate")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "Free-text search query")]
    #[serde(alias = "q", alias = "text")]
    pub query: String,
    #[schemars(description = "Maximum results to return (1-100, default: 10)")]
    #[serde(alias = "size", alias = "per_page", skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionsRequest {
    #[schemars(description = "Exact package name as published")]
    #[serde(alias = "package", alias = "crate")]
    pub name: String,
    #[schemars(description = "Maximum versions to return, newest first (1-100, default: 20)")]
    #[serde(alias = "count", skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Clamp an optional `limit` argument into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}
