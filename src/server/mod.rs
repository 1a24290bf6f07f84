//! MCP server implementation with package registry tools.
//!
//! [`PackageRegistryServer`] is an rmcp [`ServerHandler`]. One value is
//! built at startup; every session runs its own rmcp service over a clone
//! bound to that session's [`SessionSignals`].

mod requests;

pub use requests::*;

use crate::catalog::OperationCatalog;
use crate::tool_registry;
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const SERVER_NAME: &str = "package-registry-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Signals shared between one session's transport and its engine clone.
#[derive(Debug, Clone, Default)]
pub struct SessionSignals {
    /// Cancelled by the engine when an operation panics. The session is
    /// unusable from then on.
    pub fault: CancellationToken,
    /// Cancelled by the transport on teardown; running operations are dropped.
    pub shutdown: CancellationToken,
}

/// Aborts a spawned operation when the call driving it is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// MCP server for package registry lookups
#[derive(Clone)]
pub struct PackageRegistryServer {
    catalog: Arc<dyn OperationCatalog>,
    tool_mux: ToolMux<PackageRegistryServer>,
    signals: SessionSignals,
}

#[derive(Clone)]
struct ToolMux<S> {
    call_router: ToolRouter<S>,
}

impl<S> ToolMux<S>
where
    S: Send + Sync + 'static,
{
    fn new(call_router: ToolRouter<S>) -> Self {
        Self { call_router }
    }

    async fn call(
        &self,
        context: ToolCallContext<'_, S>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        self.call_router.call(context).await
    }

    fn get(&self, name: &str) -> Option<&Tool> {
        self.call_router.map.get(name).map(|route| &route.attr)
    }

    /// Routed tools in registry order.
    fn list_all(&self) -> Vec<Tool> {
        tool_registry::all_tools()
            .filter_map(|info| self.get(info.name))
            .cloned()
            .collect()
    }
}

impl PackageRegistryServer {
    pub fn new(catalog: Arc<dyn OperationCatalog>) -> Self {
        info!("Creating package registry MCP server");
        Self {
            catalog,
            tool_mux: ToolMux::new(Self::tool_router()),
            signals: SessionSignals::default(),
        }
    }

    /// A clone that reports to one session's signals.
    pub fn for_session(&self, signals: SessionSignals) -> Self {
        Self {
            signals,
            ..self.clone()
        }
    }

    fn instructions(&self) -> String {
        "Up-to-date package information from public registries. \
         \n\nTools: \
         \n- npm: npm_search, npm_details, npm_versions \
         \n- cargo: cargo_search, cargo_details, cargo_versions \
         \n- pypi: pypi_details, pypi_versions \
         \n\nTip: search first when unsure of the exact package name, then fetch details or versions."
            .to_string()
    }

    /// Run catalog operation `name` on its own task.
    ///
    /// Operation failures become `isError` results. A panic trips the
    /// session's fault signal; teardown drops the operation.
    #[instrument(skip(self, args))]
    async fn dispatch<T: Serialize>(
        &self,
        name: &'static str,
        args: &T,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call");
        let arguments = serde_json::to_value(args)
            .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {e}"), None))?;
        let Some(call) = self.catalog.call(name, arguments) else {
            return Err(McpError::invalid_params(format!("Unknown tool: {name}"), None));
        };

        let handle = tokio::spawn(call);
        let _abort = AbortOnDrop(handle.abort_handle());
        let joined = tokio::select! {
            _ = self.signals.shutdown.cancelled() => {
                return Err(McpError::internal_error("session closed", None));
            }
            joined = handle => joined,
        };

        match joined {
            Ok(Ok(value)) => Ok(success(&value)),
            Ok(Err(err)) => {
                warn!(error = %err, "tool call failed");
                Ok(err.to_tool_result())
            }
            Err(join_err) if join_err.is_panic() => {
                error!("tool panicked");
                self.signals.fault.cancel();
                Err(McpError::internal_error(format!("tool {name} panicked"), None))
            }
            Err(join_err) => Err(McpError::internal_error(join_err.to_string(), None)),
        }
    }
}

fn success(value: &Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    CallToolResult::success(vec![Content::text(text)])
}

// Tool implementations using the #[tool_router] attribute

#[tool_router]
impl PackageRegistryServer {
    #[tool(
        description = "Get detailed information about an npm package: description, latest version, \
                    license, homepage, repository, keywords, maintainers, dist-tags and the \
                    dependencies of the latest release. Scoped names (@scope/name) are supported."
    )]
    async fn npm_details(
        &self,
        Parameters(req): Parameters<PackageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("npm_details", &req).await
    }

    #[tool(
        description = "Search the npm registry by free text. Returns package names, versions, \
                    descriptions and search scores. Use this when the exact package name is unknown."
    )]
    async fn npm_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("npm_search", &req).await
    }

    #[tool(
        description = "List the published versions of an npm package, newest first, with their \
                    publish dates and the current dist-tags."
    )]
    async fn npm_versions(
        &self,
        Parameters(req): Parameters<VersionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("npm_versions", &req).await
    }

    #[tool(
        description = "Get detailed information about a Rust crate from crates.io: description, \
                    newest and max stable version, downloads, license, repository, documentation \
                    and categories."
    )]
    async fn cargo_details(
        &self,
        Parameters(req): Parameters<PackageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("cargo_details", &req).await
    }

    #[tool(
        description = "Search crates.io by free text. Returns crate names, newest versions, \
                    descriptions and download counts, plus the total number of matches."
    )]
    async fn cargo_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("cargo_search", &req).await
    }

    #[tool(
        description = "List the published versions of a crate, newest first, with publish dates, \
                    yanked flags, downloads and license."
    )]
    async fn cargo_versions(
        &self,
        Parameters(req): Parameters<VersionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("cargo_versions", &req).await
    }

    #[tool(
        description = "Get detailed information about a Python package from PyPI: summary, latest \
                    version, license, author, required Python version, project URLs, classifiers \
                    and declared requirements."
    )]
    async fn pypi_details(
        &self,
        Parameters(req): Parameters<PackageRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("pypi_details", &req).await
    }

    #[tool(
        description = "List the published versions of a Python package, newest first, with upload \
                    dates and yanked flags."
    )]
    async fn pypi_versions(
        &self,
        Parameters(req): Parameters<VersionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch("pypi_versions", &req).await
    }
}

#[tool_handler(router = self.tool_mux)]
impl ServerHandler for PackageRegistryServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(self.instructions()),
            ..Default::default()
        };
        info.server_info.name = SERVER_NAME.to_string();
        info.server_info.version = SERVER_VERSION.to_string();
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::StaticCatalog;
    use crate::tool_registry::TOOL_REGISTRY;
    use serde_json::json;
    use std::time::Duration;

    fn server() -> PackageRegistryServer {
        PackageRegistryServer::new(Arc::new(StaticCatalog))
    }

    fn package(name: &str) -> PackageRequest {
        PackageRequest {
            name: name.to_string(),
        }
    }

    fn text_of(result: &CallToolResult) -> Value {
        serde_json::to_value(result).expect("serialize")["content"][0]["text"].clone()
    }

    #[test]
    fn tools_follow_registry_order_and_text() {
        let tools = server().tool_mux.list_all();
        assert_eq!(tools.len(), TOOL_REGISTRY.len());
        for (tool, info) in tools.iter().zip(TOOL_REGISTRY) {
            let tool = serde_json::to_value(tool).expect("serialize");
            assert_eq!(tool["name"], json!(info.name));
            assert_eq!(tool["description"], json!(info.full_desc));
            assert_eq!(tool["inputSchema"]["type"], json!("object"));
        }
    }

    #[test]
    fn search_schema_describes_query() {
        let server = server();
        let search = server.tool_mux.get("cargo_search").expect("cargo_search");
        let search = serde_json::to_value(search).expect("serialize");
        assert!(search["inputSchema"]["properties"]["query"].is_object());
        assert_eq!(search["inputSchema"]["required"], json!(["query"]));
    }

    #[test]
    fn info_advertises_tools_and_identity() {
        let info = serde_json::to_value(server().get_info()).expect("serialize");
        assert!(info["capabilities"]["tools"].is_object());
        assert_eq!(info["serverInfo"]["name"], json!(SERVER_NAME));
        assert_eq!(info["serverInfo"]["version"], json!(SERVER_VERSION));
        assert!(info["instructions"]
            .as_str()
            .is_some_and(|text| text.contains("npm_search")));
    }

    #[tokio::test]
    async fn results_and_failures() {
        let server = server();
        let found = server
            .dispatch("npm_details", &package("left-pad"))
            .await
            .expect("result");
        assert_ne!(found.is_error, Some(true));
        let body: Value = serde_json::from_str(text_of(&found).as_str().expect("text"))
            .expect("json text");
        assert_eq!(body["latestVersion"], json!("1.3.0"));

        let missing = server
            .dispatch("npm_details", &package("missing"))
            .await
            .expect("result");
        assert_eq!(missing.is_error, Some(true));
        assert_eq!(text_of(&missing), json!("Package not found: missing"));
    }

    #[tokio::test]
    async fn operation_outside_the_catalog() {
        let err = server()
            .dispatch("pypi_versions", &package("django"))
            .await
            .expect_err("not in catalog");
        assert_eq!(err.message, "Unknown tool: pypi_versions");
    }

    #[tokio::test]
    async fn panic_trips_the_session_fault() {
        let signals = SessionSignals::default();
        let server = server().for_session(signals.clone());
        let outcome = server.dispatch("npm_details", &package("explode")).await;
        assert!(outcome.is_err());
        assert!(signals.fault.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_drops_running_operation() {
        let signals = SessionSignals::default();
        let server = server().for_session(signals.clone());
        let running = tokio::spawn(async move {
            server.dispatch("npm_details", &package("slow")).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        signals.shutdown.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("dropped promptly")
            .expect("join");
        assert!(outcome.is_err());
        assert!(!signals.fault.is_cancelled());
    }
}
