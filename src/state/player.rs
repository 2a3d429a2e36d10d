use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::store::StoreError;
use crate::types::*;

/// Result of a join request
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player: Player,
    pub session_token: String,
    /// False when an existing session was reused
    pub created: bool,
}

fn validate_profile(name: &str, emoji: &str) -> GameResult<(String, String)> {
    let name = name.trim();
    let emoji = emoji.trim();
    if name.is_empty() || emoji.is_empty() {
        return Err(GameError::InvalidInput(
            "Name and emoji required".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(GameError::InvalidInput(format!(
            "Name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    if emoji.len() > MAX_EMOJI_BYTES {
        return Err(GameError::InvalidInput("Pick a single emoji".to_string()));
    }
    Ok((name.to_string(), emoji.to_string()))
}

fn name_taken(err: StoreError) -> GameError {
    match err {
        StoreError::Duplicate(_) => GameError::NameTaken,
        other => GameError::Storage(other),
    }
}

impl AppState {
    /// Create a player, or update the profile behind an existing session
    pub async fn join_player(
        &self,
        name: &str,
        emoji: &str,
        session_token: Option<&str>,
    ) -> GameResult<JoinOutcome> {
        let (name, emoji) = validate_profile(name, emoji)?;
        let _engine = self.engine.lock().await;

        if let Some(token) = session_token {
            if let Some(mut player) = self.store.get_player_by_session_token(token).await? {
                let now = now_rfc3339();
                if player.display_name != name || player.emoji != emoji {
                    player.display_name = name;
                    player.emoji = emoji;
                    player.last_seen_at = now;
                    self.store
                        .update_player(player.clone())
                        .await
                        .map_err(name_taken)?;
                    tracing::info!("Player {} updated their profile", player.id);
                    self.refresh_admin_stats().await;
                } else {
                    self.store.touch_player(&player.id, &now).await?;
                    player.last_seen_at = now;
                }
                return Ok(JoinOutcome {
                    player,
                    session_token: token.to_string(),
                    created: false,
                });
            }
        }

        if self.store.find_player_by_name(&name).await?.is_some() {
            return Err(GameError::NameTaken);
        }

        let now = now_rfc3339();
        let player = Player {
            id: ulid::Ulid::new().to_string(),
            display_name: name,
            emoji,
            created_at: now.clone(),
            last_seen_at: now.clone(),
        };
        self.store
            .insert_player(player.clone())
            .await
            .map_err(name_taken)?;

        let session = Session {
            token: ulid::Ulid::new().to_string(),
            player_id: player.id.clone(),
            created_at: now,
        };
        self.store.insert_session(session.clone()).await?;
        self.store.init_score(&player.id).await?;

        tracing::info!("Player {} joined as {}", player.id, player.display_name);

        self.broadcast_to_all(ServerMessage::PlayerJoined {
            player: player.clone(),
        });
        self.refresh_admin_stats().await;

        Ok(JoinOutcome {
            player,
            session_token: session.token,
            created: true,
        })
    }

    pub async fn player_by_session(&self, session_token: &str) -> GameResult<Option<Player>> {
        Ok(self
            .store
            .get_player_by_session_token(session_token)
            .await?)
    }
}
