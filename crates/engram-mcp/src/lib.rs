//! # Engram MCP
//!
//! Memory tool service over line-oriented JSON-RPC 2.0 on stdio. The engine
//! lives in `engram-core`; this crate adds the protocol layer, the static
//! tool table, and the binary that wires up warming, background loops, and
//! shutdown.

pub mod protocol;
pub mod server;
pub mod tools;
