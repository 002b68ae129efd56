//! Call bounded context - state, session and events of the single call slot

pub mod entity;
pub mod event;
pub mod value_object;

pub use entity::Session;
pub use event::{CallFault, FaultKind, StateChange};
pub use value_object::{CallDirection, CallState, EndReason};
