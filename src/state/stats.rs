use std::collections::HashMap;

use super::AppState;
use crate::error::GameResult;
use crate::protocol::{AdminStats, PlayerStat, PromptStat, ServerMessage};
use crate::types::*;

impl AppState {
    /// Numbers for the admin dashboard
    pub async fn stats(&self) -> GameResult<AdminStats> {
        let players = self.store.get_players().await?;
        let submissions = self.store.get_submissions().await?;
        let prompts = self.store.get_prompts_ordered().await?;
        let scores = self.store.get_scores_descending().await?;

        let mut by_player: HashMap<&str, usize> = HashMap::new();
        let mut by_prompt: HashMap<&str, usize> = HashMap::new();
        for submission in &submissions {
            *by_player.entry(submission.player_id.as_str()).or_insert(0) += 1;
            *by_prompt.entry(submission.prompt_id.as_str()).or_insert(0) += 1;
        }

        let (player_stats, connected_players) = {
            let presence = self.presence.read().await;
            let stats: Vec<PlayerStat> = players
                .iter()
                .map(|p| PlayerStat {
                    player: p.clone(),
                    submission_count: by_player.get(p.id.as_str()).copied().unwrap_or(0),
                    is_connected: presence.is_connected(&p.id),
                })
                .collect();
            (stats, presence.connected_count())
        };

        let prompt_stats: Vec<PromptStat> = prompts
            .iter()
            .map(|p| PromptStat {
                id: p.id.clone(),
                text: p.text.clone(),
                submission_count: by_prompt.get(p.id.as_str()).copied().unwrap_or(0),
            })
            .collect();

        // Counts all answers, used or not
        let guess_what_eligible = prompt_stats
            .iter()
            .filter(|p| p.submission_count >= MIN_SUBMISSIONS_FOR_GUESS_WHAT)
            .count();

        Ok(AdminStats {
            total_players: players.len(),
            players: player_stats,
            connected_players,
            total_submissions: submissions.len(),
            prompt_stats,
            guess_what_eligible,
            scores,
        })
    }

    /// Push fresh stats to admin sockets, if any are listening
    pub async fn refresh_admin_stats(&self) {
        if self.admin_broadcast.receiver_count() == 0 {
            return;
        }
        match self.stats().await {
            Ok(stats) => self.broadcast_to_admin(ServerMessage::AdminStats { stats }),
            Err(e) => tracing::warn!("Failed to compute admin stats: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stats_counts() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 4).await;
        answer_prompts(&state, &players, 2).await;
        // One extra answer on a third prompt
        let prompts = state.store.get_prompts_ordered().await.unwrap();
        state
            .submit_answer(&players[0].id, &prompts[2].id, "extra", None)
            .await
            .unwrap();

        let stats = state.stats().await.unwrap();
        assert_eq!(stats.total_players, 4);
        assert_eq!(stats.total_submissions, 9);
        assert_eq!(stats.guess_what_eligible, 2);
        assert_eq!(stats.connected_players, 0);
        assert_eq!(stats.prompt_stats.len(), prompts.len());
        assert_eq!(stats.prompt_stats[2].submission_count, 1);

        let first = stats
            .players
            .iter()
            .find(|p| p.player.id == players[0].id)
            .unwrap();
        assert_eq!(first.submission_count, 3);
        assert!(!first.is_connected);
    }

    #[tokio::test]
    async fn test_admin_channel_receives_stats() {
        let state = Arc::new(AppState::default());
        let mut admin_rx = state.admin_broadcast.subscribe();

        state.join_player("Alex", "🦊", None).await.unwrap();

        match admin_rx.recv().await.unwrap() {
            ServerMessage::AdminStats { stats } => assert_eq!(stats.total_players, 1),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
