use std::sync::Arc;
use std::time::Duration;

use super::{ActiveRound, AppState, CandidateRound, Engine, Phase, PhaseTimer};
use crate::error::{GameError, GameResult};
use crate::protocol::{PublicRound, RevealPayload, ServerMessage};
use crate::types::*;

/// Wait before retrying an automatic reveal the store refused
const REVEAL_RETRY_DELAY: Duration = Duration::from_secs(5);

impl AppState {
    /// Start a round from a prepared candidate
    pub async fn start_round(self: &Arc<Self>, candidate: CandidateRound) -> GameResult<PublicRound> {
        let mut engine = self.engine.lock().await;
        if !matches!(engine.phase, Phase::Reel) {
            return Err(GameError::RoundInProgress);
        }
        self.start_round_locked(&mut engine, candidate).await
    }

    /// Select a candidate of the given type and start it in one step
    pub async fn start_next_round(self: &Arc<Self>, round_type: RoundType) -> GameResult<PublicRound> {
        let mut engine = self.engine.lock().await;
        if !matches!(engine.phase, Phase::Reel) {
            return Err(GameError::RoundInProgress);
        }
        let candidate = self.select_candidate_locked(&engine, round_type).await?;
        self.start_round_locked(&mut engine, candidate).await
    }

    async fn start_round_locked(
        self: &Arc<Self>,
        engine: &mut Engine,
        candidate: CandidateRound,
    ) -> GameResult<PublicRound> {
        let started = chrono::Utc::now();
        let deadline = started + chrono::Duration::seconds(self.config.round_seconds as i64);
        let round = candidate.into_round(
            ulid::Ulid::new().to_string(),
            started.to_rfc3339(),
            deadline.to_rfc3339(),
        );

        self.store.begin_round(round.clone()).await?;

        tracing::info!(
            "Round {} started ({:?}, submission {})",
            round.id,
            round.round_type,
            round.submission_id
        );

        let public = PublicRound::from(&round);
        let round_id = round.id.clone();
        engine.phase = Phase::RoundActive(ActiveRound {
            round,
            votes: Default::default(),
        });

        self.arm_deadline(engine, round_id, self.config.round_duration());

        self.broadcast_to_all(ServerMessage::RoundStarted {
            round: public.clone(),
        });

        Ok(public)
    }

    /// Close voting and publish results. Does nothing unless a round is active.
    pub async fn reveal_round(self: &Arc<Self>) -> GameResult<Option<RevealPayload>> {
        let mut engine = self.engine.lock().await;
        let reveal = self.reveal_locked(&mut engine).await?;
        if reveal.is_some() {
            if let Some(timer) = engine.round_timer.take() {
                timer.cancel();
            }
        }
        Ok(reveal)
    }

    fn arm_deadline(self: &Arc<Self>, engine: &mut Engine, round_id: RoundId, delay: Duration) {
        let state = Arc::clone(self);
        let timer_round = round_id.clone();
        engine.round_timer = Some(PhaseTimer::spawn(round_id, delay, async move {
            state.reveal_on_deadline(&timer_round).await
        }));
    }

    async fn reveal_on_deadline(self: &Arc<Self>, round_id: &str) {
        let mut engine = self.engine.lock().await;
        let armed = engine
            .round_timer
            .as_ref()
            .is_some_and(|t| t.round_id() == round_id);
        let current = matches!(&engine.phase, Phase::RoundActive(a) if a.round.id == round_id);
        if !armed || !current {
            tracing::debug!("Stale deadline timer for round {} ignored", round_id);
            return;
        }

        tracing::info!("Round {} deadline reached", round_id);
        if let Some(timer) = engine.round_timer.take() {
            timer.detach();
        }
        if let Err(e) = self.reveal_locked(&mut engine).await {
            tracing::error!(
                "Automatic reveal of round {} failed, retrying in {:?}: {}",
                round_id,
                REVEAL_RETRY_DELAY,
                e
            );
            self.broadcast_to_admin(ServerMessage::error(&e));
            self.arm_deadline(&mut engine, round_id.to_string(), REVEAL_RETRY_DELAY);
        }
    }

    async fn reveal_locked(self: &Arc<Self>, engine: &mut Engine) -> GameResult<Option<RevealPayload>> {
        let Phase::RoundActive(active) = &engine.phase else {
            return Ok(None);
        };
        let round = &active.round;

        let votes = self.store.get_votes_for_round(&round.id).await?;
        let (distribution, correct_voters) =
            super::tally_votes(&round.options, &round.correct_option_id, &votes);

        let revealed_at = now_rfc3339();
        self.store
            .commit_reveal(&round.id, &revealed_at, &correct_voters)
            .await?;

        // The reveal is committed; a failed read must not leave the phase behind
        let scores = match self.store.get_scores_descending().await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::error!("Failed to load scores after reveal: {}", e);
                Vec::new()
            }
        };

        let reveal = RevealPayload {
            round_id: round.id.clone(),
            correct_option_id: round.correct_option_id.clone(),
            distribution,
            correct_voters,
            author_player_id: round.author_player_id.clone(),
            scores,
        };

        tracing::info!(
            "Round {} revealed, {} of {} votes correct",
            reveal.round_id,
            reveal.correct_voters.len(),
            votes.len()
        );

        engine.phase = match std::mem::replace(&mut engine.phase, Phase::Reel) {
            Phase::RoundActive(mut active) => {
                active.round.status = RoundStatus::Revealed;
                active.round.revealed_at = Some(revealed_at);
                Phase::RoundReveal {
                    round: active,
                    reveal: reveal.clone(),
                }
            }
            other => other,
        };

        let state = Arc::clone(self);
        let timer_round = reveal.round_id.clone();
        engine.reveal_timer = Some(PhaseTimer::spawn(
            reveal.round_id.clone(),
            self.config.reveal_duration(),
            async move { state.return_on_timer(&timer_round).await },
        ));

        self.broadcast_to_all(ServerMessage::RoundRevealed {
            reveal: reveal.clone(),
        });
        self.refresh_admin_stats().await;

        Ok(Some(reveal))
    }

    /// Leave the reveal screen early. Returns false outside ROUND_REVEAL.
    pub async fn return_to_reel(&self) -> bool {
        let mut engine = self.engine.lock().await;
        if !matches!(engine.phase, Phase::RoundReveal { .. }) {
            return false;
        }
        if let Some(timer) = engine.reveal_timer.take() {
            timer.cancel();
        }
        self.return_locked(&mut engine).await;
        true
    }

    async fn return_on_timer(&self, round_id: &str) {
        let mut engine = self.engine.lock().await;
        let armed = engine
            .reveal_timer
            .as_ref()
            .is_some_and(|t| t.round_id() == round_id);
        let current =
            matches!(&engine.phase, Phase::RoundReveal { round, .. } if round.round.id == round_id);
        if !armed || !current {
            tracing::debug!("Stale reveal timer for round {} ignored", round_id);
            return;
        }
        if let Some(timer) = engine.reveal_timer.take() {
            timer.detach();
        }
        self.return_locked(&mut engine).await;
    }

    async fn return_locked(&self, engine: &mut Engine) {
        engine.phase = Phase::Reel;
        tracing::info!("Back to the reel");

        let snapshot = self.snapshot_locked(engine).await;
        self.broadcast_to_all(ServerMessage::StateUpdate { snapshot });
    }

    /// Wipe players, answers, rounds, votes and scores. Prompts are kept.
    pub async fn reset_game(&self) -> GameResult<()> {
        let mut engine = self.engine.lock().await;

        self.store.reset_game_data().await?;

        engine.cancel_timers();
        engine.phase = Phase::Reel;
        engine.reel_submission_id = None;
        self.presence.write().await.clear();

        tracing::warn!("Game reset");

        self.broadcast_to_all(ServerMessage::GameReset);
        self.refresh_admin_stats().await;
        Ok(())
    }
}
