//! Rooms - lifecycle state machine, per-room task and the registry

pub mod actor;
mod error;
pub mod registry;
pub mod state;

pub use actor::RoomHandle;
pub use error::RoomError;
pub use registry::RoomRegistry;
