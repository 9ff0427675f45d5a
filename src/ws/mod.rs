//! WebSocket transport - protocol, sessions and the upgrade handler

pub mod handler;
pub mod hub;
pub mod protocol;
pub mod session;

pub use hub::SessionHub;
