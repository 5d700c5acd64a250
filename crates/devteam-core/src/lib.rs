//! Business logic and port definitions for devteam.
//!
//! This crate defines the "ports" (the executor and repository traits) that
//! the infrastructure layer implements, and the workflow engine that drives
//! them. It depends only on `devteam-types` -- never on `devteam-infra` or any
//! database crate.

pub mod agent;
pub mod event;
pub mod repository;
pub mod workflow;
