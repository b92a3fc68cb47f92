//! Infrastructure adapters: response transports.

pub mod channel;

pub use channel::{FnChannel, InMemoryChannel};
