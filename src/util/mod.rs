//! Shared utilities.

pub mod clock;
pub mod seq;
pub mod telemetry;

pub use clock::*;
pub use seq::*;
pub use telemetry::*;
