// ---------------------------------------------------------------------------
// Chat events: the render-oriented protocol from coordinator to UI
// ---------------------------------------------------------------------------

/// Events emitted while a turn runs. A frontend uses them to redraw; the
/// session store stays the source of truth.
///
/// ```text
/// TurnStarted
/// (TextDelta | StreamError)*
/// TurnComplete | TurnFailed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The question and an empty answer were added to the session.
    TurnStarted { session_id: String, question: String },

    /// Answer text arrived and was appended to the session.
    TextDelta { session_id: String, delta: String },

    /// The backend sent an `[ERROR]` sentinel. The answer is left untouched.
    StreamError { session_id: String, message: String },

    /// The answer is frozen and the session is idle again.
    TurnComplete {
        session_id: String,
        outcome: TurnOutcome,
    },

    /// The turn failed. The answer, if empty, now holds a failure message.
    TurnFailed { session_id: String, error: String },
}

/// How an answer stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// `[DONE]` arrived.
    Done,
    /// The transport closed without `[DONE]`. Partial text is kept.
    Truncated,
    /// Cancelled before the stream ended.
    Cancelled,
}

/// Summary of a finished turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    pub tokens: usize,
    /// `[ERROR]` payloads seen along the way.
    pub errors: Vec<String>,
    pub finish: Finish,
}
