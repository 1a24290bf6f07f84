//! PyPI operations (pypi.org JSON API).

use super::{decode_args, validate_package_name, OperationFuture, UpstreamClient};
use crate::error::ToolError;
use crate::server::{clamp_limit, PackageRequest, VersionsRequest, DEFAULT_VERSIONS_LIMIT};
use futures::FutureExt;
use serde_json::{json, Value};

const API: &str = "https://pypi.org/pypi";

pub(super) fn details(client: UpstreamClient, arguments: Value) -> OperationFuture {
    fetch_details(client, arguments).boxed()
}

pub(super) fn versions(client: UpstreamClient, arguments: Value) -> OperationFuture {
    fetch_versions(client, arguments).boxed()
}

async fn fetch_details(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: PackageRequest = decode_args(arguments)?;
    let name = validate_package_name(&req.name, false)?;
    let doc = client.get_json(&format!("{API}/{name}/json"), name).await?;
    Ok(summarize_details(&doc))
}

async fn fetch_versions(client: UpstreamClient, arguments: Value) -> Result<Value, ToolError> {
    let req: VersionsRequest = decode_args(arguments)?;
    let name = validate_package_name(&req.name, false)?;
    let limit = clamp_limit(req.limit, DEFAULT_VERSIONS_LIMIT);
    let doc = client.get_json(&format!("{API}/{name}/json"), name).await?;
    Ok(summarize_versions(&doc, limit))
}

fn summarize_details(doc: &Value) -> Value {
    let info = &doc["info"];
    json!({
        "name": info["name"],
        "version": info["version"],
        "summary": info["summary"],
        "license": info["license"],
        "author": info["author"],
        "authorEmail": info["author_email"],
        "homepage": info["home_page"],
        "projectUrls": info["project_urls"],
        "requiresPython": info["requires_python"],
        "requiresDist": info["requires_dist"],
        "classifiers": info["classifiers"],
        "releaseCount": doc["releases"].as_object().map_or(0, |r| r.len()),
    })
}

fn summarize_versions(doc: &Value, limit: usize) -> Value {
    let mut releases: Vec<(&str, Option<&str>, bool)> = doc["releases"]
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(version, files)| {
                    let first = &files[0];
                    (
                        version.as_str(),
                        first["upload_time_iso_8601"].as_str(),
                        first["yanked"].as_bool().unwrap_or(false),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    // Releases without files have no upload time and sort last.
    releases.sort_by(|a, b| b.1.cmp(&a.1));
    let total = releases.len();

    json!({
        "name": doc["info"]["name"],
        "latestVersion": doc["info"]["version"],
        "totalVersions": total,
        "versions": releases
            .into_iter()
            .take(limit)
            .map(|(version, published, yanked)| {
                json!({"version": version, "published": published, "yanked": yanked})
            })
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Value {
        json!({
            "info": {
                "name": "requests",
                "version": "2.32.3",
                "summary": "Python HTTP for Humans.",
                "license": "Apache-2.0",
                "requires_python": ">=3.8",
                "requires_dist": ["charset-normalizer<4,>=2", "idna<4,>=2.5"]
            },
            "releases": {
                "2.31.0": [{"upload_time_iso_8601": "2023-05-22T15:12:42.313790Z", "yanked": false}],
                "2.32.0": [{"upload_time_iso_8601": "2024-05-20T15:00:00.000000Z", "yanked": true}],
                "2.32.3": [{"upload_time_iso_8601": "2024-05-29T15:37:49.536340Z", "yanked": false}],
                "0.0.1": []
            }
        })
    }

    #[test]
    fn details_summary() {
        let summary = summarize_details(&project());
        assert_eq!(summary["name"], json!("requests"));
        assert_eq!(summary["version"], json!("2.32.3"));
        assert_eq!(summary["requiresPython"], json!(">=3.8"));
        assert_eq!(summary["releaseCount"], json!(4));
    }

    #[test]
    fn versions_newest_first() {
        let summary = summarize_versions(&project(), 10);
        assert_eq!(summary["totalVersions"], json!(4));
        let order: Vec<_> = summary["versions"]
            .as_array()
            .expect("versions")
            .iter()
            .map(|v| v["version"].clone())
            .collect();
        assert_eq!(
            order,
            vec![json!("2.32.3"), json!("2.32.0"), json!("2.31.0"), json!("0.0.1")]
        );
        assert_eq!(summary["versions"][1]["yanked"], json!(true));
        assert_eq!(summary["versions"][3]["published"], Value::Null);
    }
}
