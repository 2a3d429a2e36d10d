use super::{AppState, Phase};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::store::StoreError;
use crate::types::*;
use std::collections::HashMap;

/// Count votes per option and collect who picked the correct one.
///
/// Every option appears in the distribution, zeros included. Votes for
/// options that aren't part of the round are ignored.
pub fn tally_votes(
    options: &[RoundOption],
    correct_option_id: &str,
    votes: &[Vote],
) -> (HashMap<OptionId, u32>, Vec<PlayerId>) {
    let mut distribution: HashMap<OptionId, u32> =
        options.iter().map(|o| (o.id.clone(), 0)).collect();
    let mut correct_voters = Vec::new();

    for vote in votes {
        if let Some(count) = distribution.get_mut(&vote.option_id) {
            *count += 1;
            if vote.option_id == correct_option_id {
                correct_voters.push(vote.player_id.clone());
            }
        }
    }

    (distribution, correct_voters)
}

impl AppState {
    /// Record a vote in the active round. Returns the number of votes so far.
    pub async fn cast_vote(&self, player_id: &str, option_id: &str) -> GameResult<usize> {
        self.record_vote(player_id, option_id, false).await
    }

    /// Vote on behalf of a client. Unlike `cast_vote`, refuses the author of
    /// the answer being guessed.
    pub async fn cast_player_vote(&self, player_id: &str, option_id: &str) -> GameResult<usize> {
        self.record_vote(player_id, option_id, true).await
    }

    async fn record_vote(
        &self,
        player_id: &str,
        option_id: &str,
        refuse_author: bool,
    ) -> GameResult<usize> {
        let mut engine = self.engine.lock().await;

        let Phase::RoundActive(active) = &mut engine.phase else {
            return Err(GameError::NoActiveRound);
        };
        if refuse_author && active.round.author_player_id == player_id {
            return Err(GameError::OwnSubmission);
        }
        if !active.round.options.iter().any(|o| o.id == option_id) {
            return Err(GameError::InvalidOption);
        }

        let vote = Vote {
            id: ulid::Ulid::new().to_string(),
            round_id: active.round.id.clone(),
            player_id: player_id.to_string(),
            option_id: option_id.to_string(),
            created_at: now_rfc3339(),
        };
        match self.store.insert_vote(vote).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(GameError::AlreadyVoted),
            Err(e) => return Err(e.into()),
        }

        active
            .votes
            .insert(player_id.to_string(), option_id.to_string());
        let count = active.votes.len();
        tracing::debug!(
            "Vote from {} in round {} ({} total)",
            player_id,
            active.round.id,
            count
        );

        self.broadcast_to_all(ServerMessage::VoteCast { count });
        self.refresh_admin_stats().await;

        Ok(count)
    }
}
