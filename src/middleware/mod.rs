//! Request-scoped middleware: structured request logs with a correlation id,
//! and per-endpoint counters feeding `/api/v1/metrics`.

pub mod logging;
pub mod metrics;

pub use logging::{RequestId, RequestLogging, REQUEST_ID_HEADER};
pub use metrics::MetricsMiddleware;
