//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CrmConfig (validated)
//!     → shared via SharedConfig (ArcSwap) to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → http server swaps the SharedConfig
//!     → services read the new values on their next call
//! ```
//!
//! Listener address, TLS and storage paths are read once at startup; a
//! reload only affects values read per request (rate limits, retries, TTLs,
//! upload limits).

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use watcher::ConfigWatcher;
pub use schema::{
    AdminConfig, AuthConfig, BootstrapConfig, CacheConfig, CrmConfig, ListenerConfig,
    MaintenanceConfig, ObservabilityConfig, RateLimitConfig, RealtimeConfig, RetryConfig,
    SecurityConfig, StorageConfig, TimeoutConfig, TlsConfig,
};

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Live configuration, swapped atomically on reload.
pub type SharedConfig = Arc<ArcSwap<CrmConfig>>;

pub fn shared(config: CrmConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}
