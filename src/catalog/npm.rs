//! npm registry operations (registry.npmjs.org).

use super::{decode_args, validate_package_name, OperationFuture, UpstreamClient};
use crate::error::ToolError;
use crate::server::{
    clamp_limit, PackageRequest, SearchRequest, VersionsRequest, DEFAULT_SEARCH_LIMIT,
    DEFAULT_VERSIONS_LIMIT,
};
use futures::FutureExt;
use serde_json::{json, Value};

const REGISTRY: &str = "https://registry.npmjs.org";

pub(super) fn details(client: UpstreamClient, arguments: Value) -> OperationFuture {
    fetch_details(client, arguments).boxed()
}

pub(super) fn search(client: UpstreamClient, arguments: Value) -> OperationFuture {
    fetch_search(client, arguments).boxed()
}

pub(super) fn versions(client: UpstreamClient, arguments: Value) -> OperationFuture {
    fetch_versions(client, arguments).boxed()
}

async fn fetch_details(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: PackageRequest = decode_args(arguments)?;
    let name = validate_package_name(&req.name, true)?;
    let doc = client.get_json(&packument_url(name), name).await?;
    Ok(summarize_details(&doc))
}

async fn fetch_search(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: SearchRequest = decode_args(arguments)?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ToolError::InvalidParams("query must not be empty".to_string()));
    }
    let size = clamp_limit(req.limit, DEFAULT_SEARCH_LIMIT);
    let doc = client
        .get_json_with_query(
            &format!("{REGISTRY}/-/v1/search"),
            &[("text", query.to_string()), ("size", size.to_string())],
            query,
        )
        .await?;
    Ok(summarize_search(query, &doc))
}

async fn fetch_versions(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: VersionsRequest = decode_args(arguments)?;
    let name = validate_package_name(&req.name, true)?;
    let limit = clamp_limit(req.limit, DEFAULT_VERSIONS_LIMIT);
    let doc = client.get_json(&packument_url(name), name).await?;
    Ok(summarize_versions(&doc, limit))
}

/// Scoped names keep their `@` but encode the separator.
fn packument_url(name: &str) -> String {
    format!("{REGISTRY}/{}", name.replace('/', "%2F"))
}

fn repository_url(repo: &Value) -> Value {
    let url = repo.as_str().or_else(|| repo["url"].as_str());
    match url {
        Some(url) => {
            let url = url.strip_prefix("git+").unwrap_or(url);
            Value::String(url.strip_suffix(".git").unwrap_or(url).to_string())
        }
        None => Value::Null,
    }
}

fn summarize_details(doc: &Value) -> Value {
    let latest = doc["dist-tags"]["latest"].as_str();
    let manifest = &doc["versions"][latest.unwrap_or_default()];
    let license = if manifest["license"].is_null() {
        &doc["license"]
    } else {
        &manifest["license"]
    };
    let maintainers: Vec<&str> = doc["maintainers"]
        .as_array()
        .map(|list| list.iter().filter_map(|m| m["name"].as_str()).collect())
        .unwrap_or_default();

    json!({
        "name": doc["name"],
        "description": doc["description"],
        "latestVersion": latest,
        "distTags": doc["dist-tags"],
        "license": license,
        "homepage": doc["homepage"],
        "repository": repository_url(&doc["repository"]),
        "keywords": doc["keywords"],
        "maintainers": maintainers,
        "dependencies": manifest.get("dependencies").cloned().unwrap_or_else(|| json!({})),
        "lastPublished": latest.map(|v| &doc["time"][v]),
        "versionCount": doc["versions"].as_object().map_or(0, |v| v.len()),
    })
}

fn summarize_search(query: &str, doc: &Value) -> Value {
    let results: Vec<Value> = doc["objects"]
        .as_array()
        .map(|objects| {
            objects
                .iter()
                .map(|hit| {
                    let pkg = &hit["package"];
                    json!({
                        "name": pkg["name"],
                        "version": pkg["version"],
                        "description": pkg["description"],
                        "score": hit["score"]["final"],
                        "link": pkg["links"]["npm"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "query": query,
        "total": doc["total"],
        "results": results,
    })
}

fn summarize_versions(doc: &Value, limit: usize) -> Value {
    let mut versions: Vec<(&str, Option<&str>)> = doc["versions"]
        .as_object()
        .map(|map| {
            map.keys()
                .map(|v| (v.as_str(), doc["time"][v.as_str()].as_str()))
                .collect()
        })
        .unwrap_or_default();
    // RFC 3339 timestamps sort lexically; unpublished-time entries go last.
    versions.sort_by(|a, b| b.1.cmp(&a.1));
    let total = versions.len();

    json!({
        "name": doc["name"],
        "distTags": doc["dist-tags"],
        "totalVersions": total,
        "versions": versions
            .into_iter()
            .take(limit)
            .map(|(version, published)| json!({"version": version, "published": published}))
            .collect::<Vec<_>>(),
    })
}
