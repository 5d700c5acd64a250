//! Infrastructure layer for devteam.
//!
//! Contains implementations of the ports defined in `devteam-core`: SQLite
//! workflow state storage, external-command task executors, and the config
//! and data-directory helpers the binary needs at startup.

pub mod agent;
pub mod config;
pub mod filesystem;
pub mod sqlite;
