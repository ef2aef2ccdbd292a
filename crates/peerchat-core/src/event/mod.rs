//! Session change events.

pub mod bus;

pub use bus::EventBus;
