//! # HTTP Middleware
//!
//! Request logging and metrics collection applied to every endpoint.

pub mod logging;
pub mod metrics;

pub use logging::RequestLogging;
pub use metrics::MetricsMiddleware;
