//! Persistence gateway.
//!
//! Plain CRUD over players, sessions, prompts, submissions, rounds, votes and
//! scores. No game policy lives here apart from the uniqueness rules the
//! engine relies on: one submission per (prompt, player), one vote per
//! (round, player), and a round can only be revealed once.

mod data;
mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::*;

pub use data::StoreData;
pub use local::LocalStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store backends
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("serialization failure: {0}")]
    Serialization(String),
}

/// Schema version of the on-disk snapshot
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Serializable copy of everything the store holds.
///
/// Runtime-only state (phase, current round, timers, presence) is not part
/// of it and starts fresh on every boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,
    pub exported_at: String,
    pub data: StoreData,
}

impl StoreSnapshot {
    pub fn new(data: StoreData) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: now_rfc3339(),
            data,
        }
    }

    /// Validate a snapshot before loading it
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }
        self.data.validate_references()
    }
}

/// Storage contract consumed by the engine and the HTTP layer
#[async_trait]
pub trait GameStore: Send + Sync {
    // Players and sessions
    async fn get_players(&self) -> StoreResult<Vec<Player>>;
    async fn get_player(&self, id: &str) -> StoreResult<Option<Player>>;
    async fn find_player_by_name(&self, name: &str) -> StoreResult<Option<Player>>;
    /// Fails with `Duplicate` if the display name is taken
    async fn insert_player(&self, player: Player) -> StoreResult<()>;
    async fn update_player(&self, player: Player) -> StoreResult<()>;
    async fn touch_player(&self, id: &str, seen_at: &str) -> StoreResult<()>;
    async fn insert_session(&self, session: Session) -> StoreResult<()>;
    async fn get_player_by_session_token(&self, token: &str) -> StoreResult<Option<Player>>;

    // Prompts
    async fn get_prompts_ordered(&self) -> StoreResult<Vec<Prompt>>;
    async fn get_prompt(&self, id: &str) -> StoreResult<Option<Prompt>>;

    // Submissions
    /// All submissions, oldest first
    async fn get_submissions(&self) -> StoreResult<Vec<Submission>>;
    /// Submissions not yet used as the basis of a round
    async fn get_unused_submissions(&self) -> StoreResult<Vec<Submission>>;
    async fn get_submissions_by_player(&self, player_id: &str) -> StoreResult<Vec<Submission>>;
    /// Insert, or update the answer of the existing (prompt, player) row
    async fn upsert_submission(
        &self,
        prompt_id: &str,
        player_id: &str,
        answer_text: String,
        context_text: Option<String>,
    ) -> StoreResult<Submission>;
    async fn mark_submission_used(&self, id: &str) -> StoreResult<()>;
    /// Returns how many flags were cleared
    async fn reset_all_submissions_unused(&self) -> StoreResult<usize>;

    // Rounds
    async fn upsert_round_record(&self, round: Round) -> StoreResult<()>;
    /// Mark the round's submission used and insert the round in one write.
    /// Fails with `NotFound` if the submission is gone.
    async fn begin_round(&self, round: Round) -> StoreResult<()>;
    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>>;

    // Votes
    /// Fails with `Duplicate` if the player already voted in that round
    async fn insert_vote(&self, vote: Vote) -> StoreResult<()>;
    async fn get_votes_for_round(&self, round_id: &str) -> StoreResult<Vec<Vote>>;

    // Scores
    async fn init_score(&self, player_id: &str) -> StoreResult<()>;
    /// Insert-or-increment, returns the new total
    async fn increment_score(&self, player_id: &str, delta: u32) -> StoreResult<u32>;
    async fn get_scores_descending(&self) -> StoreResult<Vec<ScoreEntry>>;

    /// Mark the round REVEALED and award one point to each listed player in a
    /// single write. Fails with `Conflict` if the round was already revealed.
    async fn commit_reveal(
        &self,
        round_id: &str,
        revealed_at: &str,
        awarded: &[PlayerId],
    ) -> StoreResult<()>;

    /// Delete players, sessions, submissions, rounds, votes and scores.
    /// Prompts are kept.
    async fn reset_game_data(&self) -> StoreResult<()>;

    async fn snapshot(&self) -> StoreResult<StoreSnapshot>;
}

/// Prompts every fresh store starts with
pub const DEFAULT_PROMPTS: &[(&str, PromptCategory)] = &[
    ("Anthem of 2025 (song)", PromptCategory::Core),
    ("Favorite purchase under $100", PromptCategory::Core),
    ("Favorite place you went", PromptCategory::Core),
    (
        "Small obsession (one word or short phrase)",
        PromptCategory::Core,
    ),
    ("Best late-night snack", PromptCategory::Core),
    ("Drink of the year", PromptCategory::Core),
    (
        "Best life improvement (habit, routine, mindset)",
        PromptCategory::Core,
    ),
    ("Most used app besides texting", PromptCategory::Core),
    ("Favorite movie", PromptCategory::Core),
    ("Favorite show", PromptCategory::Core),
    ("Favorite book", PromptCategory::Core),
    ("Favorite game", PromptCategory::Core),
    ("Best moment of 2025 in 3 words", PromptCategory::Sentimental),
    (
        "Something you're proud of from 2025",
        PromptCategory::Sentimental,
    ),
    (
        "One thing you're excited about in 2026",
        PromptCategory::Sentimental,
    ),
];
