//! WebSocket message dispatch
//!
//! Authorization is checked here before anything reaches the engine.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::Connection;

/// Return early unless the socket passed `admin_authenticate`
macro_rules! check_admin {
    ($conn:expr, $action:expr) => {
        if !$conn.is_admin {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the admin can {}", $action),
            });
        }
    };
}

/// Handle a client message and return the direct reply, if any.
/// Broadcast effects go out through the state's channels.
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Authenticate { session_token } => {
            match state.authenticate_connection(&conn.id, &session_token).await {
                Ok((player, snapshot, player_state)) => {
                    tracing::info!("Socket {} is player {}", conn.id, player.id);
                    conn.player_id = Some(player.id.clone());
                    Some(ServerMessage::Authenticated {
                        player,
                        state: snapshot,
                        player_state,
                    })
                }
                Err(GameError::InvalidCredential) => Some(ServerMessage::AuthError {
                    error: "Invalid session".to_string(),
                }),
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }

        ClientMessage::AdminAuthenticate { admin_code } => {
            if !state.auth.validate(&admin_code) {
                tracing::warn!("Rejected admin code on socket {}", conn.id);
                return Some(ServerMessage::AuthError {
                    error: "Invalid admin code".to_string(),
                });
            }
            match state.stats().await {
                Ok(stats) => {
                    conn.is_admin = true;
                    tracing::info!("Socket {} is an admin", conn.id);
                    Some(ServerMessage::AdminAuthenticated {
                        state: state.phase_snapshot().await,
                        stats,
                    })
                }
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }

        ClientMessage::RequestState => Some(ServerMessage::StateUpdate {
            snapshot: state.phase_snapshot().await,
        }),

        ClientMessage::CastVote { option_id } => {
            let Some(player_id) = conn.player_id.clone() else {
                return Some(ServerMessage::Error {
                    code: "UNAUTHENTICATED".to_string(),
                    msg: "Authenticate before voting".to_string(),
                });
            };
            match state.cast_player_vote(&player_id, &option_id).await {
                Ok(_) => Some(ServerMessage::VoteAck { option_id }),
                Err(e) => {
                    tracing::debug!("Vote from {} rejected: {}", player_id, e);
                    Some(ServerMessage::error(&e))
                }
            }
        }

        ClientMessage::AdminStartRound { round_type } => {
            check_admin!(conn, "start a round");
            match state.start_next_round(round_type.unwrap_or_default()).await {
                // round_started already went out to everyone
                Ok(_) => None,
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }

        ClientMessage::AdminReveal => {
            check_admin!(conn, "reveal the round");
            match state.reveal_round().await {
                Ok(Some(_)) => None,
                Ok(None) => Some(ServerMessage::error(&GameError::NoActiveRound)),
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }

        ClientMessage::AdminSkipToReel => {
            check_admin!(conn, "skip to the reel");
            if state.return_to_reel().await {
                None
            } else {
                Some(ServerMessage::StateUpdate {
                    snapshot: state.phase_snapshot().await,
                })
            }
        }

        ClientMessage::AdminReset => {
            check_admin!(conn, "reset the game");
            match state.reset_game().await {
                Ok(()) => None,
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }
    }
}
