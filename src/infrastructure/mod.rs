//! Infrastructure layer - timers, transport adapters and metrics

pub mod loopback;
pub mod telemetry;
pub mod timer;

pub use loopback::{LoopbackTransport, SessionCommand, StaticCredentialProvider};
pub use timer::{format_duration, DurationTimer};
