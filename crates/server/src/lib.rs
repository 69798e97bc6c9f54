//! HTTP surface for the docflow pipeline: routes, shared state and metrics.

pub mod api;
pub mod metrics;
pub mod state;
