//! Rust client for the CRM REST API.

mod client;

pub use client::{ApiFailure, CrmClient, SdkError, SdkResult};
