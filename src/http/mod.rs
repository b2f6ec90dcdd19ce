//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (router, middleware stack)
//!     → request.rs (request id, JSON/query/path extraction)
//!     → middleware/auth.rs (bearer token → AuthContext)
//!     → handlers/* (delegate to services)
//!     → response.rs (CrmError → status + JSON error body)
//!
//! GET /api/v1/ws → websocket.rs (rooms, forwarders, client frames)
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{ApiJson, ApiPath, ApiQuery, X_REQUEST_ID};
pub use response::{ApiError, ApiResult};
pub use server::{build_router, AppState, HttpServer};
