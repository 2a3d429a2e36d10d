use std::collections::{HashMap, HashSet};

use super::AppState;
use crate::protocol::{PhaseSnapshot, PlayerRoundState, ServerMessage};
use crate::error::{GameError, GameResult};
use crate::types::*;

/// Which sockets belong to which players. Runtime only, never persisted.
#[derive(Debug, Default)]
pub struct Presence {
    by_connection: HashMap<ConnectionId, PlayerId>,
    by_player: HashMap<PlayerId, HashSet<ConnectionId>>,
}

impl Presence {
    /// Bind a connection to a player, replacing any previous binding of that
    /// connection
    pub fn bind(&mut self, connection_id: &str, player_id: &str) {
        self.unbind(connection_id);
        self.by_connection
            .insert(connection_id.to_string(), player_id.to_string());
        self.by_player
            .entry(player_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection, returning the player it belonged to
    pub fn unbind(&mut self, connection_id: &str) -> Option<PlayerId> {
        let player_id = self.by_connection.remove(connection_id)?;
        if let Some(connections) = self.by_player.get_mut(&player_id) {
            connections.remove(connection_id);
            if connections.is_empty() {
                self.by_player.remove(&player_id);
            }
        }
        Some(player_id)
    }

    /// Number of authenticated connections
    pub fn connected_count(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.by_player.contains_key(player_id)
    }

    pub fn player_for(&self, connection_id: &str) -> Option<&PlayerId> {
        self.by_connection.get(connection_id)
    }

    pub fn clear(&mut self) {
        self.by_connection.clear();
        self.by_player.clear();
    }
}

impl AppState {
    /// Resolve a session token for a socket and mark the player connected
    pub async fn authenticate_connection(
        &self,
        connection_id: &str,
        session_token: &str,
    ) -> GameResult<(Player, PhaseSnapshot, PlayerRoundState)> {
        let engine = self.engine.lock().await;

        let mut player = self
            .store
            .get_player_by_session_token(session_token)
            .await?
            .ok_or(GameError::InvalidCredential)?;

        let seen_at = now_rfc3339();
        self.store.touch_player(&player.id, &seen_at).await?;
        player.last_seen_at = seen_at;

        let connected_count = {
            let mut presence = self.presence.write().await;
            presence.bind(connection_id, &player.id);
            presence.connected_count()
        };

        tracing::info!(
            "Player {} connected on {} ({} connected)",
            player.display_name,
            connection_id,
            connected_count
        );

        let snapshot = self.snapshot_locked(&engine).await;
        let player_state = super::player_state_locked(&engine, &player.id);

        self.broadcast_to_all(ServerMessage::PlayerConnected {
            player_id: player.id.clone(),
            connected_count,
        });
        self.refresh_admin_stats().await;

        Ok((player, snapshot, player_state))
    }

    /// Drop a socket's presence entry. No-op for unauthenticated sockets.
    pub async fn disconnect_connection(&self, connection_id: &str) -> Option<PlayerId> {
        let _engine = self.engine.lock().await;

        let (player_id, connected_count) = {
            let mut presence = self.presence.write().await;
            let player_id = presence.unbind(connection_id)?;
            (player_id, presence.connected_count())
        };

        tracing::info!(
            "Player {} disconnected from {} ({} connected)",
            player_id,
            connection_id,
            connected_count
        );

        self.broadcast_to_all(ServerMessage::PlayerDisconnected {
            player_id: player_id.clone(),
            connected_count,
        });
        self.refresh_admin_stats().await;

        Some(player_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.presence.read().await.connected_count()
    }

    pub async fn connected_player(&self, connection_id: &str) -> Option<PlayerId> {
        self.presence.read().await.player_for(connection_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use std::sync::Arc;

    #[test]
    fn test_bind_and_unbind() {
        let mut presence = Presence::default();
        presence.bind("c1", "alice");
        presence.bind("c2", "alice");
        presence.bind("c3", "bob");

        assert_eq!(presence.connected_count(), 3);
        assert!(presence.is_connected("alice"));

        assert_eq!(presence.unbind("c1").as_deref(), Some("alice"));
        assert!(presence.is_connected("alice"));
        assert_eq!(presence.unbind("c2").as_deref(), Some("alice"));
        assert!(!presence.is_connected("alice"));
        assert_eq!(presence.unbind("c2"), None);
        assert_eq!(presence.connected_count(), 1);
    }

    #[test]
    fn test_rebind_moves_connection() {
        let mut presence = Presence::default();
        presence.bind("c1", "alice");
        presence.bind("c1", "bob");

        assert_eq!(presence.connected_count(), 1);
        assert!(!presence.is_connected("alice"));
        assert_eq!(presence.player_for("c1").map(String::as_str), Some("bob"));
    }

    #[tokio::test]
    async fn test_authenticate_and_disconnect_broadcast() {
        let state = Arc::new(AppState::default());
        let outcome = state.join_player("Alex", "🦄", None).await.unwrap();
        let mut rx = state.broadcast.subscribe();

        let (player, snapshot, player_state) = state
            .authenticate_connection("c1", &outcome.session_token)
            .await
            .unwrap();
        assert_eq!(player.id, outcome.player.id);
        assert_eq!(snapshot.connected_count, 1);
        assert!(!player_state.has_voted);

        match rx.recv().await.unwrap() {
            ServerMessage::PlayerConnected {
                player_id,
                connected_count,
            } => {
                assert_eq!(player_id, player.id);
                assert_eq!(connected_count, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        assert_eq!(state.disconnect_connection("c1").await, Some(player.id.clone()));
        match rx.recv().await.unwrap() {
            ServerMessage::PlayerDisconnected {
                connected_count, ..
            } => assert_eq!(connected_count, 0),
            other => panic!("unexpected message: {:?}", other),
        }

        // Unknown connection is a no-op
        assert_eq!(state.disconnect_connection("c1").await, None);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_token() {
        let state = Arc::new(AppState::default());
        let result = state.authenticate_connection("c1", "bogus").await;
        assert!(matches!(result, Err(GameError::InvalidCredential)));
        assert_eq!(state.connected_count().await, 0);
    }

    #[tokio::test]
    async fn test_connected_count_counts_connections() {
        let state = Arc::new(AppState::default());
        let players = join_players(&state, 2).await;
        let token = state
            .join_player(&players[0].display_name, "🎲", None)
            .await;
        // Name is taken without a session
        assert!(matches!(token, Err(GameError::NameTaken)));

        let a = state.join_player("Solo", "🎯", None).await.unwrap();
        state
            .authenticate_connection("c1", &a.session_token)
            .await
            .unwrap();
        state
            .authenticate_connection("c2", &a.session_token)
            .await
            .unwrap();
        assert_eq!(state.connected_count().await, 2);
    }
}
