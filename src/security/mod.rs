//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (CORS preflight, body size)
//!     → rate_limit.rs (per-user / per-IP token buckets)
//!     → handler (bearer token → AuthContext → permission checks)
//!     → headers.rs (security response headers)
//!
//! WebSocket upgrade:
//!     → connections.rs (per-user connection cap)
//! ```

pub mod connections;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use connections::{ConnectionGuard, ConnectionTracker};
pub use rate_limit::{rate_limit_middleware, RateLimiter, Scope};
