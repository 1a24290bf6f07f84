//! Session management for the streamable HTTP transport.
//!
//! Every client session owns one [`Transport`] registered in a
//! [`SessionRegistry`] under its [`SessionId`]. The registry is the only shared
//! mutable state; transports serialize the exchanges made against them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Server Process                         │
//! │                                                          │
//! │  HTTP ──▶ FrontDoor ──▶ SessionRegistry                  │
//! │                         ├─ create / lookup / remove      │
//! │                         └─ HashMap<SessionId, Session>   │
//! │                                   │                      │
//! │              ┌────────────────────┼──────────────┐       │
//! │              ▼                    ▼              ▼       │
//! │       ┌────────────┐      ┌────────────┐  ┌────────────┐ │
//! │       │ Transport  │      │ Transport  │  │ Transport  │ │
//! │       │ (session A)│      │ (session B)│  │    ...     │ │
//! │       └─────┬──────┘      └─────┬──────┘  └─────┬──────┘ │
//! │             ▼                   ▼               ▼        │
//! │       rmcp service        rmcp service       ...         │
//! │       (server clone)      (server clone)                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions live in process memory, so all requests for a session must reach
//! the process that created it.

mod reaper;
mod registry;
pub mod stream;
mod transport;
mod types;

pub use reaper::spawn_idle_reaper;
pub use registry::{Session, SessionRegistry};
pub use stream::{EventStream, StreamEvent};
pub use transport::{Exchange, ExchangeOutput, ResponseMode, Transport, TransportConfig};
pub use types::{SessionId, TransportState};
