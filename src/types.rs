use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type PromptId = String;
pub type SubmissionId = String;
pub type RoundId = String;
pub type OptionId = String;
pub type VoteId = String;
pub type ConnectionId = String;

/// Longest display name a player may pick
pub const MAX_NAME_CHARS: usize = 20;
/// Answers are shown as option labels in Guess What rounds, so keep them short
pub const MAX_ANSWER_CHARS: usize = 60;
pub const MAX_CONTEXT_CHARS: usize = 280;
pub const MAX_EMOJI_BYTES: usize = 16;

/// Every round offers the true answer plus this many decoys
pub const DECOY_COUNT: usize = 3;
pub const OPTION_COUNT: usize = DECOY_COUNT + 1;
/// Guess Who needs the author plus three other people to pick from
pub const MIN_PLAYERS_FOR_GUESS_WHO: usize = OPTION_COUNT;
/// Guess What needs four unused answers on the same prompt
pub const MIN_SUBMISSIONS_FOR_GUESS_WHAT: usize = OPTION_COUNT;

/// Global game status as seen by clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Reel,
    RoundActive,
    RoundReveal,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundType {
    /// Show an answer, guess which player wrote it
    #[default]
    GuessWho,
    /// Show a player, guess which answer is theirs
    GuessWhat,
}

impl RoundType {
    /// Lenient parse for query strings; anything unknown falls back to Guess Who
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_uppercase()) {
            Some(v) if v == "GUESS_WHAT" => RoundType::GuessWhat,
            _ => RoundType::GuessWho,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Pending,
    Active,
    Revealed,
}

/// Round timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub round_seconds: u64,
    pub reveal_seconds: u64,
    pub reel_tick_seconds: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_seconds: 20,
            reveal_seconds: 10,
            reel_tick_seconds: 8,
        }
    }
}

impl GameConfig {
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_seconds)
    }

    pub fn reveal_duration(&self) -> Duration {
        Duration::from_secs(self.reveal_seconds)
    }

    pub fn reel_tick_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_secs(self.reel_tick_seconds.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub emoji: String,
    pub created_at: String,
    pub last_seen_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub player_id: PlayerId,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    Core,
    Sentimental,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
    pub category: PromptCategory,
    pub order_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: SubmissionId,
    pub prompt_id: PromptId,
    pub player_id: PlayerId,
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_text: Option<String>,
    /// Round-eligibility flag. The reel ignores it.
    pub is_used_in_round: bool,
    pub created_at: String,
}

/// A choice offered to voters. Guess Who options carry a player,
/// Guess What options carry an answer text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundOption {
    pub id: OptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub is_correct: bool,
}

/// Who is shown in a Guess What round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShownPerson {
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptRef {
    pub id: PromptId,
    pub text: String,
}

/// Persisted round row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub round_type: RoundType,
    pub prompt: PromptRef,
    pub submission_id: SubmissionId,
    pub author_player_id: PlayerId,
    pub status: RoundStatus,
    pub options: Vec<RoundOption>,
    pub correct_option_id: OptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_person: Option<ShownPerson>,
    pub started_at: Option<String>,
    pub deadline_at: Option<String>,
    pub revealed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: VoteId,
    pub round_id: RoundId,
    pub player_id: PlayerId,
    pub option_id: OptionId,
    pub created_at: String,
}

/// Leaderboard row (score joined with the player it belongs to)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub emoji: String,
    pub points: u32,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
