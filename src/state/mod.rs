mod player;
mod presence;
mod reel;
mod round;
mod selector;
mod stats;
mod submission;
mod timer;
mod vote;

pub use player::JoinOutcome;
pub use presence::Presence;
pub use reel::{spawn_reel_ticker, ReelTicker};
pub use selector::{select_from_pool, CandidateRound};
pub use timer::PhaseTimer;
pub use vote::tally_votes;

use crate::auth::AuthConfig;
use crate::protocol::{PhaseSnapshot, PlayerRoundState, PublicRound, RevealPayload, ServerMessage};
use crate::store::{GameStore, LocalStore};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const BROADCAST_CAPACITY: usize = 256;

/// A round that is running or being revealed, with its in-memory tally
#[derive(Debug, Clone)]
pub(crate) struct ActiveRound {
    pub round: Round,
    /// player -> option they picked
    pub votes: HashMap<PlayerId, OptionId>,
}

/// Authoritative game phase. Round-carrying variants make "REEL has no
/// current round" hold by construction.
#[derive(Debug)]
pub(crate) enum Phase {
    Reel,
    RoundActive(ActiveRound),
    RoundReveal {
        round: ActiveRound,
        reveal: RevealPayload,
    },
}

impl Phase {
    pub fn status(&self) -> GameStatus {
        match self {
            Phase::Reel => GameStatus::Reel,
            Phase::RoundActive(_) => GameStatus::RoundActive,
            Phase::RoundReveal { .. } => GameStatus::RoundReveal,
        }
    }

    pub fn current_round(&self) -> Option<&ActiveRound> {
        match self {
            Phase::Reel => None,
            Phase::RoundActive(active) => Some(active),
            Phase::RoundReveal { round, .. } => Some(round),
        }
    }
}

/// Everything guarded by the engine mutex
#[derive(Debug)]
pub(crate) struct Engine {
    pub phase: Phase,
    /// Fires the automatic reveal at the round deadline
    pub round_timer: Option<PhaseTimer>,
    /// Fires the automatic return to the reel
    pub reveal_timer: Option<PhaseTimer>,
    pub reel_submission_id: Option<SubmissionId>,
}

impl Engine {
    fn new() -> Self {
        Self {
            phase: Phase::Reel,
            round_timer: None,
            reveal_timer: None,
            reel_submission_id: None,
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.round_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.reveal_timer.take() {
            timer.cancel();
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn GameStore>,
    pub config: GameConfig,
    pub auth: AuthConfig,
    pub(crate) engine: Mutex<Engine>,
    pub(crate) presence: RwLock<Presence>,
    /// Events for every connected socket
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Events for admin sockets only
    pub admin_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new(store: Arc<dyn GameStore>, config: GameConfig, auth: AuthConfig) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        let (admin_tx, _admin_rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            store,
            config,
            auth,
            engine: Mutex::new(Engine::new()),
            presence: RwLock::new(Presence::default()),
            broadcast: tx,
            admin_broadcast: admin_tx,
        }
    }

    /// Send a message to every connected socket
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.broadcast.send(msg);
    }

    /// Send a message to admin sockets only
    pub fn broadcast_to_admin(&self, msg: ServerMessage) {
        let _ = self.admin_broadcast.send(msg);
    }

    pub async fn game_status(&self) -> GameStatus {
        self.engine.lock().await.phase.status()
    }

    /// Full view of the current phase. Never includes the correct option
    /// before reveal.
    pub async fn phase_snapshot(&self) -> PhaseSnapshot {
        let engine = self.engine.lock().await;
        self.snapshot_locked(&engine).await
    }

    /// Whether the given player voted in (or wrote) the current round
    pub async fn player_round_state(&self, player_id: &str) -> PlayerRoundState {
        let engine = self.engine.lock().await;
        player_state_locked(&engine, player_id)
    }

    pub(crate) async fn snapshot_locked(&self, engine: &Engine) -> PhaseSnapshot {
        let current = engine.phase.current_round();
        let reveal = match &engine.phase {
            Phase::RoundReveal { reveal, .. } => Some(reveal.clone()),
            _ => None,
        };

        let reel_item = match self.reel_item_locked(engine).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("Failed to load reel item for snapshot: {}", e);
                None
            }
        };

        PhaseSnapshot {
            status: engine.phase.status(),
            current_round: current.map(|a| PublicRound::from(&a.round)),
            reveal,
            reel_item,
            vote_count: current.map(|a| a.votes.len()).unwrap_or(0),
            connected_count: self.presence.read().await.connected_count(),
            server_now: now_rfc3339(),
        }
    }
}

pub(crate) fn player_state_locked(engine: &Engine, player_id: &str) -> PlayerRoundState {
    match engine.phase.current_round() {
        Some(active) => {
            let voted = active.votes.get(player_id).cloned();
            PlayerRoundState {
                has_voted: voted.is_some(),
                voted_option_id: voted,
                is_round_author: active.round.author_player_id == player_id,
            }
        }
        None => PlayerRoundState::default(),
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(LocalStore::in_memory()),
            GameConfig::default(),
            AuthConfig::default(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::{StoreError, StoreResult, StoreSnapshot};
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// In-memory store whose chosen operations fail with an I/O error
    pub struct FlakyStore {
        inner: LocalStore,
        failing: std::sync::Mutex<HashSet<&'static str>>,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self {
                inner: LocalStore::in_memory(),
                failing: Default::default(),
            }
        }

        pub fn fail(&self, op: &'static str) {
            self.failing.lock().unwrap().insert(op);
        }

        pub fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn check(&self, op: &'static str) -> StoreResult<()> {
            if self.failing.lock().unwrap().contains(op) {
                return Err(StoreError::Io(format!("{} failed", op)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GameStore for FlakyStore {
        async fn get_players(&self) -> StoreResult<Vec<Player>> {
            self.check("get_players")?;
            self.inner.get_players().await
        }
        async fn get_player(&self, id: &str) -> StoreResult<Option<Player>> {
            self.check("get_player")?;
            self.inner.get_player(id).await
        }
        async fn find_player_by_name(&self, name: &str) -> StoreResult<Option<Player>> {
            self.check("find_player_by_name")?;
            self.inner.find_player_by_name(name).await
        }
        async fn insert_player(&self, player: Player) -> StoreResult<()> {
            self.check("insert_player")?;
            self.inner.insert_player(player).await
        }
        async fn update_player(&self, player: Player) -> StoreResult<()> {
            self.check("update_player")?;
            self.inner.update_player(player).await
        }
        async fn touch_player(&self, id: &str, seen_at: &str) -> StoreResult<()> {
            self.check("touch_player")?;
            self.inner.touch_player(id, seen_at).await
        }
        async fn insert_session(&self, session: Session) -> StoreResult<()> {
            self.check("insert_session")?;
            self.inner.insert_session(session).await
        }
        async fn get_player_by_session_token(&self, token: &str) -> StoreResult<Option<Player>> {
            self.check("get_player_by_session_token")?;
            self.inner.get_player_by_session_token(token).await
        }
        async fn get_prompts_ordered(&self) -> StoreResult<Vec<Prompt>> {
            self.check("get_prompts_ordered")?;
            self.inner.get_prompts_ordered().await
        }
        async fn get_prompt(&self, id: &str) -> StoreResult<Option<Prompt>> {
            self.check("get_prompt")?;
            self.inner.get_prompt(id).await
        }
        async fn get_submissions(&self) -> StoreResult<Vec<Submission>> {
            self.check("get_submissions")?;
            self.inner.get_submissions().await
        }
        async fn get_unused_submissions(&self) -> StoreResult<Vec<Submission>> {
            self.check("get_unused_submissions")?;
            self.inner.get_unused_submissions().await
        }
        async fn get_submissions_by_player(&self, player_id: &str) -> StoreResult<Vec<Submission>> {
            self.check("get_submissions_by_player")?;
            self.inner.get_submissions_by_player(player_id).await
        }
        async fn upsert_submission(
            &self,
            prompt_id: &str,
            player_id: &str,
            answer_text: String,
            context_text: Option<String>,
        ) -> StoreResult<Submission> {
            self.check("upsert_submission")?;
            self.inner
                .upsert_submission(prompt_id, player_id, answer_text, context_text)
                .await
        }
        async fn mark_submission_used(&self, id: &str) -> StoreResult<()> {
            self.check("mark_submission_used")?;
            self.inner.mark_submission_used(id).await
        }
        async fn reset_all_submissions_unused(&self) -> StoreResult<usize> {
            self.check("reset_all_submissions_unused")?;
            self.inner.reset_all_submissions_unused().await
        }
        async fn upsert_round_record(&self, round: Round) -> StoreResult<()> {
            self.check("upsert_round_record")?;
            self.inner.upsert_round_record(round).await
        }
        async fn begin_round(&self, round: Round) -> StoreResult<()> {
            self.check("begin_round")?;
            self.inner.begin_round(round).await
        }
        async fn get_round(&self, id: &str) -> StoreResult<Option<Round>> {
            self.check("get_round")?;
            self.inner.get_round(id).await
        }
        async fn insert_vote(&self, vote: Vote) -> StoreResult<()> {
            self.check("insert_vote")?;
            self.inner.insert_vote(vote).await
        }
        async fn get_votes_for_round(&self, round_id: &str) -> StoreResult<Vec<Vote>> {
            self.check("get_votes_for_round")?;
            self.inner.get_votes_for_round(round_id).await
        }
        async fn init_score(&self, player_id: &str) -> StoreResult<()> {
            self.check("init_score")?;
            self.inner.init_score(player_id).await
        }
        async fn increment_score(&self, player_id: &str, delta: u32) -> StoreResult<u32> {
            self.check("increment_score")?;
            self.inner.increment_score(player_id, delta).await
        }
        async fn get_scores_descending(&self) -> StoreResult<Vec<ScoreEntry>> {
            self.check("get_scores_descending")?;
            self.inner.get_scores_descending().await
        }
        async fn commit_reveal(
            &self,
            round_id: &str,
            revealed_at: &str,
            awarded: &[PlayerId],
        ) -> StoreResult<()> {
            self.check("commit_reveal")?;
            self.inner.commit_reveal(round_id, revealed_at, awarded).await
        }
        async fn reset_game_data(&self) -> StoreResult<()> {
            self.check("reset_game_data")?;
            self.inner.reset_game_data().await
        }
        async fn snapshot(&self) -> StoreResult<StoreSnapshot> {
            self.check("snapshot")?;
            self.inner.snapshot().await
        }
    }

    /// State on top of a `FlakyStore`, with the store handle for the test
    pub fn flaky_state() -> (Arc<AppState>, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::new());
        let state = Arc::new(AppState::new(
            store.clone(),
            GameConfig::default(),
            AuthConfig::default(),
        ));
        (state, store)
    }

    /// Join `count` players named P1..Pn
    pub async fn join_players(state: &Arc<AppState>, count: usize) -> Vec<Player> {
        let mut players = Vec::new();
        for i in 1..=count {
            let outcome = state
                .join_player(&format!("P{}", i), "🎲", None)
                .await
                .unwrap();
            players.push(outcome.player);
        }
        players
    }

    /// Every player answers the first `prompts` prompts
    pub async fn answer_prompts(state: &Arc<AppState>, players: &[Player], prompts: usize) {
        let all = state.store.get_prompts_ordered().await.unwrap();
        for prompt in all.iter().take(prompts) {
            for player in players {
                state
                    .submit_answer(
                        &player.id,
                        &prompt.id,
                        &format!("{} says {}", player.display_name, prompt.order_index),
                        None,
                    )
                    .await
                    .unwrap();
            }
        }
    }
}
