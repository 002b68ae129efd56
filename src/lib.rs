//! YakPhone - single-line softphone call control built with Rust
//!
//! A Domain-Driven Design implementation of the call-control core of a
//! browser-style softphone: one call slot, hold, mute, DTMF, warm and cold
//! transfers, over an abstract signaling transport.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{CallSessionController, CallSnapshot, DeviceRegistrationManager, Softphone};
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
