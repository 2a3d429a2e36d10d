//! Error types shared by the engine, the socket layer and the HTTP layer.

use crate::store::StoreError;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Per-request failures. None of these are fatal to the shared game.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Need at least 4 players for a round")]
    InsufficientPlayers,

    #[error("No prompt has enough unused answers for this round type")]
    InsufficientSubmissions,

    #[error("No active round")]
    NoActiveRound,

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Option does not belong to the current round")]
    InvalidOption,

    #[error("A round is already in progress")]
    RoundInProgress,

    #[error("You cannot vote on your own answer")]
    OwnSubmission,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Name already taken")]
    NameTaken,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl GameError {
    /// Stable code sent to clients in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InsufficientPlayers => "INSUFFICIENT_PLAYERS",
            GameError::InsufficientSubmissions => "INSUFFICIENT_SUBMISSIONS",
            GameError::NoActiveRound => "NO_ACTIVE_ROUND",
            GameError::AlreadyVoted => "ALREADY_VOTED",
            GameError::InvalidOption => "INVALID_OPTION",
            GameError::RoundInProgress => "ROUND_IN_PROGRESS",
            GameError::OwnSubmission => "OWN_SUBMISSION",
            GameError::InvalidCredential => "INVALID_CREDENTIAL",
            GameError::InvalidInput(_) => "INVALID_INPUT",
            GameError::NameTaken => "NAME_TAKEN",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether the client should resync via `request_state`
    pub fn is_stale_view(&self) -> bool {
        matches!(self, GameError::NoActiveRound | GameError::RoundInProgress)
    }
}
