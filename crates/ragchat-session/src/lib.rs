pub mod error;
pub mod sessions;
pub mod store;

pub use error::{Error, Result};
pub use sessions::{DEFAULT_TITLE, Message, MessageStatus, Role, Session, derive_title};
pub use store::{SessionStore, SessionsSnapshot, SharedSessionStore};
