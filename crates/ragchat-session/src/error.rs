#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid state for session '{session_id}': {reason}")]
    InvalidState {
        session_id: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
