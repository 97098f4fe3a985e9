//! Dispatch layer
//!
//! Messages carrying share manager operations to the host that owns them, and
//! the in-process bus that delivers them to per-host worker queues.

pub mod bus;
pub mod message;

pub use bus::MessageBus;
pub use message::{Envelope, ShareMessage};
