use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this socket to a player session
    Authenticate {
        session_token: String,
    },
    /// Subscribe this socket to admin events
    AdminAuthenticate {
        admin_code: String,
    },
    /// Ask for a fresh `state_update`
    RequestState,
    CastVote {
        option_id: OptionId,
    },
    // Admin-only messages
    AdminStartRound {
        #[serde(default)]
        round_type: Option<RoundType>,
    },
    AdminReveal,
    AdminSkipToReel,
    AdminReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        connection_id: ConnectionId,
        server_now: String,
    },
    Authenticated {
        player: Player,
        state: PhaseSnapshot,
        player_state: PlayerRoundState,
    },
    AdminAuthenticated {
        state: PhaseSnapshot,
        stats: AdminStats,
    },
    AuthError {
        error: String,
    },
    StateUpdate {
        #[serde(flatten)]
        snapshot: PhaseSnapshot,
    },
    ReelTick {
        item: ReelItem,
    },
    RoundStarted {
        round: PublicRound,
    },
    /// Votes so far in the active round. Never says who voted for what.
    VoteCast {
        count: usize,
    },
    RoundRevealed {
        #[serde(flatten)]
        reveal: RevealPayload,
    },
    GameReset,
    PlayerJoined {
        player: Player,
    },
    PlayerConnected {
        player_id: PlayerId,
        connected_count: usize,
    },
    PlayerDisconnected {
        player_id: PlayerId,
        connected_count: usize,
    },
    SubmissionAdded {
        prompt_id: PromptId,
        player_id: PlayerId,
    },
    /// Admin-only
    AdminStats {
        #[serde(flatten)]
        stats: AdminStats,
    },
    VoteAck {
        option_id: OptionId,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

/// Option as shown to voters, without correctness
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicOption {
    pub id: OptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<&RoundOption> for PublicOption {
    fn from(option: &RoundOption) -> Self {
        Self {
            id: option.id.clone(),
            player_id: option.player_id.clone(),
            name: option.name.clone(),
            emoji: option.emoji.clone(),
            text: option.text.clone(),
        }
    }
}

/// Round as shown to clients. Carries neither the correct option nor the author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicRound {
    pub id: RoundId,
    pub round_type: RoundType,
    pub prompt: PromptRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_person: Option<ShownPerson>,
    pub options: Vec<PublicOption>,
    pub started_at: Option<String>,
    pub deadline_at: Option<String>,
}

impl From<&Round> for PublicRound {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id.clone(),
            round_type: round.round_type,
            prompt: round.prompt.clone(),
            show_answer: round.show_answer.clone(),
            show_person: round.show_person.clone(),
            options: round.options.iter().map(PublicOption::from).collect(),
            started_at: round.started_at.clone(),
            deadline_at: round.deadline_at.clone(),
        }
    }
}

/// Results of a revealed round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevealPayload {
    pub round_id: RoundId,
    pub correct_option_id: OptionId,
    /// Vote count for each option, zeros included
    pub distribution: HashMap<OptionId, u32>,
    pub correct_voters: Vec<PlayerId>,
    pub author_player_id: PlayerId,
    pub scores: Vec<ScoreEntry>,
}

/// Submission currently on the reel. The author stays hidden.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReelItem {
    pub submission_id: SubmissionId,
    pub prompt_id: PromptId,
    pub prompt_text: String,
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_text: Option<String>,
}

/// Everything a client needs to render the current phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseSnapshot {
    pub status: GameStatus,
    pub current_round: Option<PublicRound>,
    /// Present during ROUND_REVEAL
    pub reveal: Option<RevealPayload>,
    pub reel_item: Option<ReelItem>,
    pub vote_count: usize,
    pub connected_count: usize,
    pub server_now: String,
}

/// The caller's own relation to the current round
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerRoundState {
    pub has_voted: bool,
    pub voted_option_id: Option<OptionId>,
    pub is_round_author: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStat {
    #[serde(flatten)]
    pub player: Player,
    pub submission_count: usize,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptStat {
    pub id: PromptId,
    pub text: String,
    pub submission_count: usize,
}

/// Admin dashboard numbers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminStats {
    pub players: Vec<PlayerStat>,
    pub total_players: usize,
    pub connected_players: usize,
    pub total_submissions: usize,
    pub prompt_stats: Vec<PromptStat>,
    /// Prompts with enough answers for a Guess What round
    pub guess_what_eligible: usize,
    pub scores: Vec<ScoreEntry>,
}
