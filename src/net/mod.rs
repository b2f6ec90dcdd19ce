//! Network layer.
//!
//! Plain TCP listeners are bound directly with Tokio; `tls.rs` prepares the
//! rustls configuration when `listener.tls` is set.

pub mod tls;

pub use tls::load_tls_config;
