//! Observability setup: meter provider construction and tracing init.

pub mod metrics;
pub mod tracing;
