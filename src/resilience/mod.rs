//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Service write:
//!     → read current document + version
//!     → apply change, compare-and-swap
//!     → on VersionConflict: retries.rs (backoff.rs delay, try again)
//! ```

pub mod backoff;
pub mod retries;

pub use retries::retry_on_conflict;
