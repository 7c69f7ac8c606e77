//! lifeline-core: domain logic for the human-in-the-loop question bridge.
//!
//! This crate contains the session table, reply matcher, coordinator, and
//! the Slack transport. It knows nothing about MCP; the `lifeline-mcp`
//! binary wires the coordinator to a stdio tool server.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod reply;
pub mod session;
pub mod transport;
pub mod types;
