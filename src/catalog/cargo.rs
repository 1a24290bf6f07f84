//! crates.io operations.

use super::{decode_args, validate_package_name, OperationFuture, UpstreamClient};
use crate::error::ToolError;
use crate::server::{
    clamp_limit, PackageRequest, SearchRequest, VersionsRequest, DEFAULT_SEARCH_LIMIT,
    DEFAULT_VERSIONS_LIMIT,
};
use futures::FutureExt;
use serde_json::{json, Value};

const API: &str = "https://crates.io/api/v1/crates";

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
    let name = validate_package_name(&req.name, false)?;
    let doc = client.get_json(&format!("{API}/{name}"), name).await?;
    Ok(summarize_details(&doc))
}

async fn fetch_search(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: SearchRequest = decode_args(arguments)?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ToolError::InvalidParams("query must not be empty".to_string()));
    }
    let per_page = clamp_limit(req.limit, DEFAULT_SEARCH_LIMIT);
    let doc = client
        .get_json_with_query(
            API,
            &[("q", query.to_string()), ("per_page", per_page.to_string())],
            query,
        )
        .await?;
    Ok(summarize_search(query, &doc))
}

async fn fetch_versions(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: VersionsRequest = decode_args(arguments)?;
    let name = validate_package_name(&req.name, false)?;
    let limit = clamp_limit(req.limit, DEFAULT_VERSIONS_LIMIT);
    let doc = client
        .get_json(&format!("{API}/{name}/versions"), name)
        .await?;
    Ok(summarize_versions(name, &doc, limit))
}

fn summarize_details(doc: &Value) -> Value {
    let krate = &doc["crate"];
    let categories: Vec<&Value> = doc["categories"]
        .as_array()
        .map(|list| list.iter().map(|c| &c["category"]).collect())
        .unwrap_or_default();

    json!({
        "name": krate["name"],
        "description": krate["description"],
        "newestVersion": krate["newest_version"],
        "maxStableVersion": krate["max_stable_version"],
        "downloads": krate["downloads"],
        "recentDownloads": krate["recent_downloads"],
        "license": doc["versions"][0]["license"],
        "repository": krate["repository"],
        "documentation": krate["documentation"],
        "homepage": krate["homepage"],
        "keywords": krate["keywords"],
        "categories": categories,
        "createdAt": krate["created_at"],
        "updatedAt": krate["updated_at"],
    })
}

fn summarize_search(query: &str, doc: &Value) -> Value {
    let results: Vec<Value> = doc["crates"]
        .as_array()
        .map(|crates| {
            crates
                .iter()
                .map(|c| {
                    json!({
                        "name": c["name"],
                        "version": c["max_stable_version"].as_str().or(c["newest_version"].as_str()),
                        "description": c["description"],
                        "downloads": c["downloads"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "query": query,
        "total": doc["meta"]["total"],
        "results": results,
    })
}

/// crates.io already lists versions newest first.
fn summarize_versions(name: &str, doc: &Value, limit: usize) -> Value {
    let all = doc["versions"].as_array().map(Vec::as_slice).unwrap_or_default();
    let versions: Vec<Value> = all
        .iter()
        .take(limit)
        .map(|v| {
            json!({
                "version": v["num"],
                "published": v["created_at"],
                "yanked": v["yanked"].as_bool().unwrap_or(false),
                "downloads": v["downloads"],
                "license": v["license"],
            })
        })
        .collect();

    json!({
        "name": name,
        "totalVersions": all.len(),
        "versions": versions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_summary() {
        let doc = json!({
            "crate": {
                "name": "serde",
                "description": "A generic serialization/deserialization framework",
                "newest_version": "1.0.210",
                "max_stable_version": "1.0.210",
                "downloads": 400000000u64,
                "repository": "https://github.com/serde-rs/serde"
            },
            "versions": [{"num": "1.0.210", "license": "MIT OR Apache-2.0"}],
            "categories": [{"category": "Encoding"}, {"category": "No standard library"}]
        });
        let summary = summarize_details(&doc);
        assert_eq!(summary["name"], json!("serde"));
        assert_eq!(summary["maxStableVersion"], json!("1.0.210"));
        assert_eq!(summary["license"], json!("MIT OR Apache-2.0"));
        assert_eq!(summary["categories"], json!(["Encoding", "No standard library"]));
    }

    #[test]
    fn search_prefers_stable_version() {
        let doc = json!({
            "crates": [
                {"name": "tokio", "newest_version": "2.0.0-alpha.1", "max_stable_version": "1.40.0"},
                {"name": "tokio-fake", "newest_version": "0.1.0", "max_stable_version": null}
            ],
            "meta": {"total": 2}
        });
        let summary = summarize_search("tokio", &doc);
        assert_eq!(summary["total"], json!(2));
        assert_eq!(summary["results"][0]["version"], json!("1.40.0"));
        assert_eq!(summary["results"][1]["version"], json!("0.1.0"));
    }

    #[test]
    fn versions_are_limited() {
        let doc = json!({
            "versions": [
                {"num": "1.1.0", "created_at": "2024-02-01T00:00:00Z", "yanked": false},
                {"num": "1.0.1", "created_at": "2024-01-15T00:00:00Z", "yanked": true},
                {"num": "1.0.0", "created_at": "2024-01-01T00:00:00Z"}
            ]
        });
        let summary = summarize_versions("demo", &doc, 2);
        assert_eq!(summary["totalVersions"], json!(3));
        let versions = summary["versions"].as_array().expect("versions");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1]["yanked"], json!(true));
    }
}
