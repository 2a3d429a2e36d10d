use rand::seq::IndexedRandom;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{AppState, Engine, Phase};
use crate::error::GameResult;
use crate::protocol::{ReelItem, ServerMessage};
use crate::types::*;

/// Handle to the background reel task
#[derive(Debug)]
pub struct ReelTicker {
    handle: JoinHandle<()>,
}

impl ReelTicker {
    pub fn stop(self) {
        tracing::info!("Stopping reel ticker");
        self.handle.abort();
    }
}

/// Spawn a background task that moves the reel to a random answer every
/// tick while no round is running
pub fn spawn_reel_ticker(state: Arc<AppState>) -> ReelTicker {
    let period = state.config.reel_tick_interval();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = state.advance_reel().await {
                tracing::error!("Reel tick failed: {}", e);
            }
        }
    });
    tracing::info!("Reel ticker started ({:?} period)", period);
    ReelTicker { handle }
}

impl AppState {
    /// Show a random answer on the reel. Used and unused answers are both
    /// fair game. Does nothing outside REEL or without answers.
    pub async fn advance_reel(&self) -> GameResult<Option<ReelItem>> {
        let mut engine = self.engine.lock().await;
        if !matches!(engine.phase, Phase::Reel) {
            return Ok(None);
        }

        let submissions = self.store.get_submissions().await?;
        let Some(pick) = submissions.choose(&mut rand::rng()).cloned() else {
            return Ok(None);
        };

        let item = self.reel_item_for(&pick).await?;
        engine.reel_submission_id = Some(pick.id);

        self.broadcast_to_all(ServerMessage::ReelTick { item: item.clone() });
        Ok(Some(item))
    }

    /// The answer currently on the reel, falling back to the oldest answer
    pub async fn current_reel_item(&self) -> GameResult<Option<ReelItem>> {
        let engine = self.engine.lock().await;
        self.reel_item_locked(&engine).await
    }

    pub(crate) async fn reel_item_locked(&self, engine: &Engine) -> GameResult<Option<ReelItem>> {
        let submissions = self.store.get_submissions().await?;
        let recorded = engine
            .reel_submission_id
            .as_ref()
            .and_then(|id| submissions.iter().find(|s| &s.id == id));

        match recorded.or_else(|| submissions.first()) {
            Some(submission) => Ok(Some(self.reel_item_for(submission).await?)),
            None => Ok(None),
        }
    }

    async fn reel_item_for(&self, submission: &Submission) -> GameResult<ReelItem> {
        let prompt_text = self
            .store
            .get_prompt(&submission.prompt_id)
            .await?
            .map(|p| p.text)
            .unwrap_or_default();

        Ok(ReelItem {
            submission_id: submission.id.clone(),
            prompt_id: submission.prompt_id.clone(),
            prompt_text,
            answer_text: submission.answer_text.clone(),
            context_text: submission.context_text.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_advance_without_submissions() {
        let state = AppState::default();
        let mut rx = state.broadcast.subscribe();

        assert!(state.advance_reel().await.unwrap().is_none());
        assert!(state.current_reel_item().await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_current_item_defaults_to_oldest() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 2).await;
        answer_prompts(&state, &players, 1).await;

        let oldest = state.store.get_submissions().await.unwrap()[0].clone();
        let item = state.current_reel_item().await.unwrap().unwrap();
        assert_eq!(item.submission_id, oldest.id);
        assert!(!item.prompt_text.is_empty());
    }

    #[tokio::test]
    async fn test_advance_records_and_broadcasts() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 3).await;
        answer_prompts(&state, &players, 1).await;
        let mut rx = state.broadcast.subscribe();

        let item = state.advance_reel().await.unwrap().unwrap();
        assert_eq!(
            state.current_reel_item().await.unwrap().unwrap().submission_id,
            item.submission_id
        );
        match rx.recv().await.unwrap() {
            ServerMessage::ReelTick { item: sent } => assert_eq!(sent, item),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reel_paused_during_round() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 4).await;
        answer_prompts(&state, &players, 1).await;
        state.start_next_round(RoundType::GuessWho).await.unwrap();

        assert!(state.advance_reel().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_with_zero_submissions() {
        let state = Arc::new(AppState::default());
        let mut rx = state.broadcast.subscribe();
        let ticker = spawn_reel_ticker(state.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        ticker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_emits_ticks() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 2).await;
        answer_prompts(&state, &players, 1).await;
        let mut rx = state.broadcast.subscribe();
        let ticker = spawn_reel_ticker(state.clone());

        tokio::time::sleep(Duration::from_secs(17)).await;
        let mut ticks = 0;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMessage::ReelTick { .. }) {
                ticks += 1;
            }
        }
        assert_eq!(ticks, 2);

        ticker.stop();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
