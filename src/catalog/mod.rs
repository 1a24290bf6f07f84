//! Operation catalog: the package lookups the engine can dispatch to.
//!
//! Each operation is a plain function from decoded arguments to a JSON
//! result or a [`ToolError`]. The table is fixed at startup from
//! [`TOOL_REGISTRY`](crate::tool_registry::TOOL_REGISTRY); tool descriptors
//! and argument schemas come from the server's tool router.

mod cargo;
mod npm;
mod pypi;
mod upstream;

pub use upstream::UpstreamClient;

use crate::error::ToolError;
use crate::tool_registry::{ToolInfo, TOOL_REGISTRY};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Longest package name accepted by any supported registry.
const MAX_NAME_LEN: usize = 214;

/// Future returned by an operation. `'static` so the engine can spawn it.
pub type OperationFuture = BoxFuture<'static, Result<Value, ToolError>>;

/// The set of operations exposed as MCP tools.
pub trait OperationCatalog: Send + Sync {
    /// Start operation `name`. `None` if no such operation exists.
    fn call(&self, name: &str, arguments: Value) -> Option<OperationFuture>;
}

type Handler = fn(UpstreamClient, Value) -> OperationFuture;

struct Operation {
    info: &'static ToolInfo,
    handler: Handler,
}

/// Catalog backed by the public npm, crates.io and PyPI registries.
pub struct RegistryCatalog {
    client: UpstreamClient,
    operations: Vec<Operation>,
}

impl RegistryCatalog {
    pub fn new(client: UpstreamClient) -> Self {
        let operations = TOOL_REGISTRY
            .iter()
            .filter_map(|info| match bind(info.name) {
                Some(handler) => Some(Operation { info, handler }),
                None => {
                    warn!(tool = info.name, "No handler for registered tool");
                    None
                }
            })
            .collect();
        Self { client, operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn bind(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        "npm_details" => npm::details,
        "npm_search" => npm::search,
        "npm_versions" => npm::versions,
        "cargo_details" => cargo::details,
        "cargo_search" => cargo::search,
        "cargo_versions" => cargo::versions,
        "pypi_details" => pypi::details,
        "pypi_versions" => pypi::versions,
        _ => return None,
    };
    Some(handler)
}

impl OperationCatalog for RegistryCatalog {
    fn call(&self, name: &str, arguments: Value) -> Option<OperationFuture> {
        let op = self.operations.iter().find(|op| op.info.name == name)?;
        Some((op.handler)(self.client.clone(), arguments))
    }
}

pub(crate) fn decode_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

/// Sanity check a package name before it goes into an upstream URL.
/// `scoped` allows one `@scope/` prefix (npm).
pub(crate) fn validate_package_name(name: &str, scoped: bool) -> Result<&str, ToolError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ToolError::InvalidParams(
            "package name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ToolError::InvalidParams(format!(
            "package name longer than {MAX_NAME_LEN} characters"
        )));
    }
    let bare = match name.strip_prefix('@') {
        Some(rest) if scoped => match rest.split_once('/') {
            Some((scope, pkg)) if !scope.is_empty() && !pkg.is_empty() => {
                format!("{scope}{pkg}")
            }
            _ => {
                return Err(ToolError::InvalidParams(format!(
                    "invalid scoped package name: {name}"
                )))
            }
        },
        _ => name.to_string(),
    };
    let valid = !bare.starts_with('.')
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
    if !valid {
        return Err(ToolError::InvalidParams(format!(
            "invalid package name: {name}"
        )));
    }
    Ok(name)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory catalog for engine and transport tests.
    //!
    //! Only `npm_details` exists. The package name picks the behaviour:
    //! `left-pad` resolves, `slow` never finishes in test time, `explode`
    //! panics and anything else is not found.

    use super::*;
    use crate::server::PackageRequest;
    use futures::FutureExt;
    use serde_json::json;
    use std::time::Duration;

    pub struct StaticCatalog;

    impl OperationCatalog for StaticCatalog {
        fn call(&self, name: &str, arguments: Value) -> Option<OperationFuture> {
            (name == "npm_details").then(|| details(arguments).boxed())
        }
    }

    async fn details(arguments: Value) -> Result<Value, ToolError> {
        let req: PackageRequest = decode_args(arguments)?;
        match req.name.as_str() {
            "left-pad" => Ok(json!({"name": "left-pad", "latestVersion": "1.3.0"})),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!({}))
            }
            "explode" => panic!("operation exploded"),
            _ => Err(ToolError::NotFound(req.name)),
        }
    }
}
