//! Protocol layer
//!
//! JSON-RPC 2.0 over stdio for the memory tool service.

pub mod messages;
pub mod stdio;
pub mod types;
