//! Domain layer - Core call-control rules and the ports to the outside
//!
//! This layer contains:
//! - Value objects and entities of the single call slot
//! - Domain events published to subscribers
//! - Ports (traits) for the transport capability and credential issuing

pub mod call;
pub mod registration;
pub mod shared;
pub mod transfer;
pub mod transport;

// Re-export commonly used types
pub use shared::{DomainError, Result};
