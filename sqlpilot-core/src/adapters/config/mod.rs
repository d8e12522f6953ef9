//! Configuration types for database adapters.
//!
//! # Security
//! These configuration structs intentionally do NOT store passwords or credentials.

mod connection;

pub use connection::ConnectionConfig;
