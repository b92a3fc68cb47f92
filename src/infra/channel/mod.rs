//! Response transports implementing [`ResponseChannel`](crate::core::ResponseChannel).

pub mod callback;
pub mod memory;

pub use callback::FnChannel;
pub use memory::InMemoryChannel;
