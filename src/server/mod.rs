//! HTTP server.
//!
//! This module provides:
//! - The question answering endpoint
//! - Health, status, metrics and manual sync endpoints
//! - Logging and Prometheus metrics shared with the sync engine

mod app;
pub mod metrics;
mod observability;
mod rest;

pub use app::{cancel_on_signal, App, ServerConfig};
pub use observability::{init_tracing, spans, TracingConfig};
pub use rest::{create_rest_router, AppState, ErrorResponse, HealthResponse};
