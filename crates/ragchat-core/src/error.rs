/// Why a send request was refused. Nothing has changed when this is returned.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("no active session")]
    NoActiveSession,

    #[error("session not found: {0}")]
    UnknownSession(String),

    #[error("session '{0}' already has a response in progress")]
    Busy(String),
}

/// How a turn failed after it was accepted.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("backend request failed: {0}")]
    Backend(#[from] ragchat_backend::Error),

    #[error("answer stream failed: {0}")]
    Stream(#[from] ragchat_stream::Error),

    #[error("answer stream ended without any text ({} backend errors)", .errors.len())]
    NoAnswer { errors: Vec<String> },

    #[error(transparent)]
    Session(#[from] ragchat_session::Error),

    #[error("session '{0}' went away mid-turn")]
    SessionGone(String),

    #[error("turn task aborted: {0}")]
    Aborted(String),
}

/// Errors from session management in [`ChatClient`](crate::ChatClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("backend request failed: {0}")]
    Backend(#[from] ragchat_backend::Error),

    #[error(transparent)]
    Session(#[from] ragchat_session::Error),
}
