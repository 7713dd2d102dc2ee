pub mod client;
pub mod coordinator;
pub mod error;
pub mod event;
mod guard;
#[cfg(test)]
mod testing;

pub use client::ChatClient;
pub use coordinator::{CoordinatorConfig, StreamCoordinator, TurnHandle, TurnState};
pub use error::{ClientError, SendError, TurnError};
pub use event::{ChatEvent, Finish, TurnOutcome};

/// Shown in place of an answer that never produced any text.
pub const FAILURE_MESSAGE: &str = "Error: Failed to get response";

/// Shown in place of an answer cancelled before any text arrived.
pub const CANCELLED_MESSAGE: &str = "Error: Response cancelled";
