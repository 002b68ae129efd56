//! Application layer - the call session controller and its collaborators
//!
//! This layer orchestrates domain objects over the transport port:
//! - One actor owns the call slot and serializes every operation
//! - Transfers run a second leg next to the original one
//! - Device registration and credential refresh live beside the controller

pub mod controller;
pub mod registration;
pub(crate) mod session_leg;
pub mod softphone;
pub(crate) mod transfer;

pub use controller::{CallSessionController, CallSnapshot};
pub use registration::DeviceRegistrationManager;
pub use softphone::Softphone;
