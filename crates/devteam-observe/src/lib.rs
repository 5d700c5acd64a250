//! Observability setup for devteam: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
