//! Real-time delivery of mutations.
//!
//! # Data Flow
//! ```text
//! service mutation
//!     → CrmEvent (tenant, optional lead)
//!     → Hub::publish → broadcast channel per room
//!     → http/websocket.rs forwards frames to each subscribed socket
//! ```

pub mod event;
pub mod hub;

pub use event::{CrmEvent, EventType, Room};
pub use hub::Hub;
