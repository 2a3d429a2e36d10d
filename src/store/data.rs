use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{StoreError, StoreResult, DEFAULT_PROMPTS};
use crate::types::*;

/// All persisted tables. Every operation is synchronous; the async backends
/// wrap this behind a lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    pub players: HashMap<PlayerId, Player>,
    /// Keyed by session token
    pub sessions: HashMap<String, Session>,
    pub prompts: HashMap<PromptId, Prompt>,
    pub submissions: HashMap<SubmissionId, Submission>,
    pub rounds: HashMap<RoundId, Round>,
    pub votes: HashMap<VoteId, Vote>,
    pub scores: HashMap<PlayerId, u32>,
}

fn oldest_first(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl StoreData {
    /// Insert the default prompts if there are none
    pub fn seed_default_prompts(&mut self) -> bool {
        if !self.prompts.is_empty() {
            return false;
        }
        for (index, (text, category)) in DEFAULT_PROMPTS.iter().enumerate() {
            let prompt = Prompt {
                id: ulid::Ulid::new().to_string(),
                text: text.to_string(),
                category: category.clone(),
                order_index: index as u32 + 1,
            };
            self.prompts.insert(prompt.id.clone(), prompt);
        }
        true
    }

    /// Check that every foreign key points at an existing row
    pub fn validate_references(&self) -> Result<(), String> {
        for session in self.sessions.values() {
            if !self.players.contains_key(&session.player_id) {
                return Err(format!(
                    "Session references player '{}' which doesn't exist",
                    session.player_id
                ));
            }
        }
        for (id, sub) in &self.submissions {
            if !self.players.contains_key(&sub.player_id) {
                return Err(format!(
                    "Submission '{}' references player '{}' which doesn't exist",
                    id, sub.player_id
                ));
            }
            if !self.prompts.contains_key(&sub.prompt_id) {
                return Err(format!(
                    "Submission '{}' references prompt '{}' which doesn't exist",
                    id, sub.prompt_id
                ));
            }
        }
        for (id, vote) in &self.votes {
            if !self.rounds.contains_key(&vote.round_id) {
                return Err(format!(
                    "Vote '{}' references round '{}' which doesn't exist",
                    id, vote.round_id
                ));
            }
        }
        Ok(())
    }

    pub fn players(&self) -> Vec<Player> {
        let mut players: Vec<_> = self.players.values().cloned().collect();
        players.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        players
    }

    pub fn find_player_by_name(&self, name: &str) -> Option<Player> {
        self.players
            .values()
            .find(|p| p.display_name == name)
            .cloned()
    }

    pub fn insert_player(&mut self, player: Player) -> StoreResult<()> {
        if self.players.contains_key(&player.id) {
            return Err(StoreError::Duplicate(format!("player id {}", player.id)));
        }
        if self.find_player_by_name(&player.display_name).is_some() {
            return Err(StoreError::Duplicate(format!(
                "player name {}",
                player.display_name
            )));
        }
        self.players.insert(player.id.clone(), player);
        Ok(())
    }

    pub fn update_player(&mut self, player: Player) -> StoreResult<()> {
        if self
            .players
            .values()
            .any(|p| p.id != player.id && p.display_name == player.display_name)
        {
            return Err(StoreError::Duplicate(format!(
                "player name {}",
                player.display_name
            )));
        }
        match self.players.get_mut(&player.id) {
            Some(existing) => {
                *existing = player;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("player {}", player.id))),
        }
    }

    pub fn touch_player(&mut self, id: &str, seen_at: &str) -> StoreResult<()> {
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("player {}", id)))?;
        player.last_seen_at = seen_at.to_string();
        Ok(())
    }

    pub fn insert_session(&mut self, session: Session) -> StoreResult<()> {
        if !self.players.contains_key(&session.player_id) {
            return Err(StoreError::NotFound(format!("player {}", session.player_id)));
        }
        if self.sessions.contains_key(&session.token) {
            return Err(StoreError::Duplicate("session token".to_string()));
        }
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    pub fn player_by_session_token(&self, token: &str) -> Option<Player> {
        let session = self.sessions.get(token)?;
        self.players.get(&session.player_id).cloned()
    }

    pub fn prompts_ordered(&self) -> Vec<Prompt> {
        let mut prompts: Vec<_> = self.prompts.values().cloned().collect();
        prompts.sort_by_key(|p| p.order_index);
        prompts
    }

    pub fn submissions(&self) -> Vec<Submission> {
        let mut subs: Vec<_> = self.submissions.values().cloned().collect();
        oldest_first(&mut subs);
        subs
    }

    pub fn unused_submissions(&self) -> Vec<Submission> {
        let mut subs: Vec<_> = self
            .submissions
            .values()
            .filter(|s| !s.is_used_in_round)
            .cloned()
            .collect();
        oldest_first(&mut subs);
        subs
    }

    pub fn submissions_by_player(&self, player_id: &str) -> Vec<Submission> {
        let mut subs: Vec<_> = self
            .submissions
            .values()
            .filter(|s| s.player_id == player_id)
            .cloned()
            .collect();
        oldest_first(&mut subs);
        subs
    }

    pub fn upsert_submission(
        &mut self,
        prompt_id: &str,
        player_id: &str,
        answer_text: String,
        context_text: Option<String>,
    ) -> StoreResult<Submission> {
        if !self.prompts.contains_key(prompt_id) {
            return Err(StoreError::NotFound(format!("prompt {}", prompt_id)));
        }
        if !self.players.contains_key(player_id) {
            return Err(StoreError::NotFound(format!("player {}", player_id)));
        }

        if let Some(existing) = self
            .submissions
            .values_mut()
            .find(|s| s.prompt_id == prompt_id && s.player_id == player_id)
        {
            existing.answer_text = answer_text;
            existing.context_text = context_text;
            return Ok(existing.clone());
        }

        let submission = Submission {
            id: ulid::Ulid::new().to_string(),
            prompt_id: prompt_id.to_string(),
            player_id: player_id.to_string(),
            answer_text,
            context_text,
            is_used_in_round: false,
            created_at: now_rfc3339(),
        };
        self.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    pub fn mark_submission_used(&mut self, id: &str) -> StoreResult<()> {
        let submission = self
            .submissions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", id)))?;
        submission.is_used_in_round = true;
        Ok(())
    }

    pub fn reset_all_submissions_unused(&mut self) -> usize {
        let mut cleared = 0;
        for submission in self.submissions.values_mut() {
            if submission.is_used_in_round {
                submission.is_used_in_round = false;
                cleared += 1;
            }
        }
        cleared
    }

    pub fn upsert_round_record(&mut self, round: Round) {
        self.rounds.insert(round.id.clone(), round);
    }

    /// Mark the round's submission used and store the round. Nothing changes
    /// unless both succeed.
    pub fn begin_round(&mut self, round: Round) -> StoreResult<()> {
        if self.rounds.contains_key(&round.id) {
            return Err(StoreError::Duplicate(format!("round {}", round.id)));
        }
        self.mark_submission_used(&round.submission_id)?;
        self.upsert_round_record(round);
        Ok(())
    }

    pub fn insert_vote(&mut self, vote: Vote) -> StoreResult<()> {
        if !self.rounds.contains_key(&vote.round_id) {
            return Err(StoreError::NotFound(format!("round {}", vote.round_id)));
        }
        if self
            .votes
            .values()
            .any(|v| v.round_id == vote.round_id && v.player_id == vote.player_id)
        {
            return Err(StoreError::Duplicate(format!(
                "vote for round {} by player {}",
                vote.round_id, vote.player_id
            )));
        }
        self.votes.insert(vote.id.clone(), vote);
        Ok(())
    }

    pub fn votes_for_round(&self, round_id: &str) -> Vec<Vote> {
        let mut votes: Vec<_> = self
            .votes
            .values()
            .filter(|v| v.round_id == round_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        votes
    }

    pub fn init_score(&mut self, player_id: &str) {
        self.scores.entry(player_id.to_string()).or_insert(0);
    }

    pub fn increment_score(&mut self, player_id: &str, delta: u32) -> u32 {
        let points = self.scores.entry(player_id.to_string()).or_insert(0);
        *points += delta;
        *points
    }

    /// Leaderboard, highest first, ties broken by name
    pub fn scores_descending(&self) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self
            .scores
            .iter()
            .filter_map(|(player_id, points)| {
                self.players.get(player_id).map(|p| ScoreEntry {
                    player_id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    emoji: p.emoji.clone(),
                    points: *points,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        entries
    }

    pub fn commit_reveal(
        &mut self,
        round_id: &str,
        revealed_at: &str,
        awarded: &[PlayerId],
    ) -> StoreResult<()> {
        let round = self
            .rounds
            .get_mut(round_id)
            .ok_or_else(|| StoreError::NotFound(format!("round {}", round_id)))?;
        if round.status == RoundStatus::Revealed {
            return Err(StoreError::Conflict(format!(
                "round {} already revealed",
                round_id
            )));
        }
        round.status = RoundStatus::Revealed;
        round.revealed_at = Some(revealed_at.to_string());

        for player_id in awarded {
            self.increment_score(player_id, 1);
        }
        Ok(())
    }

    pub fn reset_game_data(&mut self) {
        self.players.clear();
        self.sessions.clear();
        self.submissions.clear();
        self.rounds.clear();
        self.votes.clear();
        self.scores.clear();
    }
}
