//! Keeps list tables current from decoded chain events.

pub mod events;
pub mod handler;
pub mod replay;

pub use events::{ChainEvent, EventLog};
pub use handler::EventHandler;
pub use replay::{replay_file, ReplayStats};
