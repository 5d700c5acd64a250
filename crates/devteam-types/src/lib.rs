//! Shared domain types for devteam.
//!
//! This crate contains the workflow state machine's plain data: states and
//! their static table, the run context, checkpoints, executor results,
//! recovery options, stats, events and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
