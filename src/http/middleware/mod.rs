//! Request-level middleware and extractors.

pub mod auth;
pub mod metrics;

pub use auth::BearerToken;
pub use metrics::track_metrics;
