//! Multi-tenant CRM server.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──HTTP/WS──▶ http (router, auth extractor, handlers, websocket)
//!                          │
//!                          ▼
//!                       services (Crm: tenants, users, leads, activities,
//!                          │       quotes, storage)
//!             ┌────────────┼──────────────┬───────────────┐
//!             ▼            ▼              ▼               ▼
//!          pipeline      store          realtime         cache
//!       (12 categories) (tenant-scoped  (rooms, Hub)    (TTL maps)
//!                        documents,
//!                        JSON snapshot)
//!
//!   Cross-cutting: config (hot reload), auth, security, observability,
//!                  resilience (retry-on-write), lifecycle, admin
//! ```

// Domain
pub mod cache;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod realtime;
pub mod services;
pub mod store;
pub mod validation;

// Serving
pub mod admin;
pub mod auth;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::CrmConfig;
pub use error::{CrmError, CrmResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use services::Crm;
