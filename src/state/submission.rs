use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::*;

impl AppState {
    /// Answer a prompt, or replace the caller's earlier answer to it
    pub async fn submit_answer(
        &self,
        player_id: &str,
        prompt_id: &str,
        answer_text: &str,
        context_text: Option<&str>,
    ) -> GameResult<Submission> {
        let answer = answer_text.trim();
        if answer.is_empty() {
            return Err(GameError::InvalidInput(
                "Prompt and answer required".to_string(),
            ));
        }
        if answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(GameError::InvalidInput(format!(
                "Answer must be at most {} characters",
                MAX_ANSWER_CHARS
            )));
        }
        let context = context_text
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if context
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_CONTEXT_CHARS)
        {
            return Err(GameError::InvalidInput(format!(
                "Context must be at most {} characters",
                MAX_CONTEXT_CHARS
            )));
        }

        let _engine = self.engine.lock().await;

        if self.store.get_prompt(prompt_id).await?.is_none() {
            return Err(GameError::NotFound(format!("prompt {}", prompt_id)));
        }
        if self.store.get_player(player_id).await?.is_none() {
            return Err(GameError::NotFound(format!("player {}", player_id)));
        }

        let submission = self
            .store
            .upsert_submission(prompt_id, player_id, answer.to_string(), context)
            .await?;

        tracing::debug!(
            "Player {} answered prompt {} ({})",
            player_id,
            prompt_id,
            submission.id
        );

        self.broadcast_to_all(ServerMessage::SubmissionAdded {
            prompt_id: submission.prompt_id.clone(),
            player_id: submission.player_id.clone(),
        });
        self.refresh_admin_stats().await;

        Ok(submission)
    }
}
