//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open store (snapshot) → Seed operator → Crm
//!
//! Running (maintenance.rs):
//!     every interval → purge sessions/caches → expire quotes → flush snapshot
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Final snapshot → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod maintenance;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use maintenance::{flush_snapshot, Maintenance, SweepReport};
pub use shutdown::Shutdown;
pub use startup::{build_crm, open_store};
