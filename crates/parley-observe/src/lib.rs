//! Observability setup for Parley: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
