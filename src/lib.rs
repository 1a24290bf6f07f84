//! Package Registry MCP Server
//!
//! This library provides an MCP (Model Context Protocol) server over
//! streamable HTTP that answers questions about packages published on npm,
//! crates.io and PyPI.
//!
//! # Architecture
//!
//! Many logical MCP sessions are multiplexed over one HTTP server:
//!
//! - **FrontDoor** (`http`): classifies each HTTP request by verb and session
//!   header, and turns the outcome of an exchange back into a response (JSON,
//!   SSE stream, or a `{error, message}` body).
//!
//! - **SessionRegistry** (`session`): the map from session id to transport;
//!   the only shared mutable state.
//!
//! - **Transport** (`session`): per-session state machine
//!   (`Uninitialized -> Active -> Closed`). Exchanges against one transport
//!   run one at a time. The handshake starts the session's own rmcp service.
//!
//! - **PackageRegistryServer** (`server`): the rmcp `ServerHandler` with the
//!   tool router. Each session serves a clone of it.
//!
//! - **RegistryCatalog** (`catalog`): the fixed set of lookup operations.
//!
//! # Tools
//!
//! ## npm
//! - `npm_details`: Package metadata, latest version and its dependencies
//! - `npm_search`: Free-text search
//! - `npm_versions`: Published versions with publish dates
//!
//! ## Cargo
//! - `cargo_details`: Crate metadata, downloads and categories
//! - `cargo_search`: Free-text search
//! - `cargo_versions`: Published versions with yanked flags
//!
//! ## PyPI
//! - `pypi_details`: Project metadata and requirements
//! - `pypi_versions`: Released versions with upload dates

pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tool_registry;

pub use catalog::{OperationCatalog, RegistryCatalog, UpstreamClient};
pub use config::ServerConfig;
pub use error::{ConfigError, ProtocolError, SessionError, ToolError, TransportError};
pub use http::{serve, FrontDoor};
pub use server::PackageRegistryServer;
pub use session::{spawn_idle_reaper, SessionId, SessionRegistry, Transport, TransportState};
pub use tool_registry::{ToolCategory, ToolInfo, TOOL_REGISTRY};
