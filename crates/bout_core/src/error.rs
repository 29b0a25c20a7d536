use crate::models::{Color, MatchStatus};
use thiserror::Error;

/// Registry and transport level failures.
#[derive(Error, Debug)]
pub enum BoutError {
    #[error("Unknown match code: {code}")]
    UnknownCode { code: String },

    #[error("Match code already in use: {code}")]
    DuplicateCode { code: String },

    #[error("Malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why the state machine refused a command.
///
/// Rejections never mutate the match. Most are silent no-ops; a few are
/// reported back to the calling connection only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Wrong password")]
    BadPassphrase,

    #[error("Not a registered referee")]
    UnknownReferee,

    #[error("Points must be 1, 2 or 3 (got {0})")]
    InvalidPoints(i64),

    #[error("Score delta must be non-zero")]
    ZeroDelta,

    #[error("Not allowed while {0}")]
    WrongStatus(MatchStatus),

    #[error("Match is over")]
    MatchOver,

    #[error("Referee roster incomplete: {connected}/{required} connected, {untested} untested")]
    RosterNotReady {
        connected: usize,
        required: usize,
        untested: usize,
    },

    #[error("A replay challenge is already pending")]
    ChallengePending,

    #[error("No replay challenge pending")]
    NoChallenge,

    #[error("No replay budget left for {0}")]
    NoReplayBudget(Color),

    #[error("Nothing to undo")]
    EmptyHistory,

    #[error("Empty name")]
    EmptyName,
}

impl Rejection {
    /// Whether the caller (and only the caller) should be told about it.
    pub fn notify_caller(&self) -> bool {
        matches!(self, Rejection::BadPassphrase | Rejection::EmptyHistory)
    }
}

pub type Result<T> = std::result::Result<T, BoutError>;
