//! HTTP API endpoints.
//!
//! Player routes resolve the caller from the session token. Admin routes sit
//! behind the shared-code middleware.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{self, ADMIN_CODE_COOKIE, SESSION_COOKIE};
use crate::error::{GameError, GameResult};
use crate::protocol::{AdminStats, PhaseSnapshot, PlayerRoundState, RevealPayload};
use crate::state::{AppState, CandidateRound};
use crate::store::StoreSnapshot;
use crate::types::*;
use crate::ws;

/// Cookies live for the length of a long weekend party and then some
const COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

impl GameError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GameError::InvalidInput(_)
            | GameError::InvalidOption
            | GameError::InsufficientPlayers
            | GameError::InsufficientSubmissions => StatusCode::BAD_REQUEST,
            GameError::InvalidCredential => StatusCode::UNAUTHORIZED,
            GameError::OwnSubmission => StatusCode::FORBIDDEN,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::NoActiveRound
            | GameError::RoundInProgress
            | GameError::AlreadyVoted
            | GameError::NameTaken => StatusCode::CONFLICT,
            GameError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(serde_json::json!({
                "code": self.code(),
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

fn cookie(name: &str, value: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, COOKIE_MAX_AGE_SECS
    )
}

async fn require_player(state: &AppState, headers: &HeaderMap) -> GameResult<Player> {
    let token = auth::session_token(headers).ok_or(GameError::InvalidCredential)?;
    state
        .player_by_session(&token)
        .await?
        .ok_or(GameError::InvalidCredential)
}

/// Everything a client needs on first load or after a reconnect
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: PhaseSnapshot,
    pub player: Option<Player>,
    pub player_state: Option<PlayerRoundState>,
    pub prompts: Vec<Prompt>,
    /// The caller's own answers
    pub submissions: Vec<Submission>,
}

/// Current phase plus the caller's view of it.
///
/// GET /api/state
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> GameResult<Json<StateResponse>> {
    let player = match auth::session_token(&headers) {
        Some(token) => state.player_by_session(&token).await?,
        None => None,
    };

    let (player_state, submissions) = match &player {
        Some(p) => (
            Some(state.player_round_state(&p.id).await),
            state.store.get_submissions_by_player(&p.id).await?,
        ),
        None => (None, Vec::new()),
    };

    Ok(Json(StateResponse {
        state: state.phase_snapshot().await,
        player,
        player_state,
        prompts: state.store.get_prompts_ordered().await?,
        submissions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub player: Player,
    pub session_token: String,
}

/// Join the party, or update the profile behind the caller's session.
///
/// POST /api/join
pub async fn join(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<JoinRequest>,
) -> GameResult<Response> {
    let existing = auth::session_token(&headers);
    let outcome = state
        .join_player(&req.name, &req.emoji, existing.as_deref())
        .await?;

    let set_cookie = cookie(SESSION_COOKIE, &outcome.session_token);
    Ok((
        [(header::SET_COOKIE, set_cookie)],
        Json(JoinResponse {
            player: outcome.player,
            session_token: outcome.session_token,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub prompt_id: PromptId,
    pub answer_text: String,
    #[serde(default)]
    pub context_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission: Submission,
}

/// Answer a prompt. Answering the same prompt again replaces the answer.
///
/// POST /api/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> GameResult<Json<SubmitResponse>> {
    let player = require_player(&state, &headers).await?;
    let submission = state
        .submit_answer(
            &player.id,
            &req.prompt_id,
            &req.answer_text,
            req.context_text.as_deref(),
        )
        .await?;
    Ok(Json(SubmitResponse { submission }))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_id: OptionId,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub count: usize,
}

/// POST /api/vote
pub async fn vote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> GameResult<Json<VoteResponse>> {
    let player = require_player(&state, &headers).await?;
    let count = state.cast_player_vote(&player.id, &req.option_id).await?;
    Ok(Json(VoteResponse {
        success: true,
        count,
    }))
}

#[derive(Debug, Serialize)]
pub struct ScoresResponse {
    pub scores: Vec<ScoreEntry>,
}

/// Leaderboard, highest first.
///
/// GET /api/scores
pub async fn scores(State(state): State<Arc<AppState>>) -> GameResult<Json<ScoresResponse>> {
    let scores = state.store.get_scores_descending().await?;
    Ok(Json(ScoresResponse { scores }))
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub prompts: Vec<Prompt>,
}

/// GET /api/prompts
pub async fn prompts(State(state): State<Arc<AppState>>) -> GameResult<Json<PromptsResponse>> {
    let prompts = state.store.get_prompts_ordered().await?;
    Ok(Json(PromptsResponse { prompts }))
}

/// Confirms the admin code and remembers it in a cookie.
///
/// GET /api/admin/verify
pub async fn admin_verify(State(state): State<Arc<AppState>>) -> Response {
    let set_cookie = cookie(ADMIN_CODE_COOKIE, &state.auth.admin_code);
    (
        [(header::SET_COOKIE, set_cookie)],
        Json(serde_json::json!({ "valid": true })),
    )
        .into_response()
}

/// GET /api/admin/stats
pub async fn admin_stats(State(state): State<Arc<AppState>>) -> GameResult<Json<AdminStats>> {
    Ok(Json(state.stats().await?))
}

#[derive(Debug, Serialize)]
pub struct SubmissionsResponse {
    pub submissions: Vec<Submission>,
}

/// GET /api/admin/submissions
pub async fn admin_submissions(
    State(state): State<Arc<AppState>>,
) -> GameResult<Json<SubmissionsResponse>> {
    let submissions = state.store.get_submissions().await?;
    Ok(Json(SubmissionsResponse { submissions }))
}

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    #[serde(rename = "type")]
    pub round_type: Option<String>,
}

/// Preview the round that would be started next. Nothing is persisted, but
/// an exhausted pool is recycled.
///
/// GET /api/admin/candidate?type=GUESS_WHO
pub async fn admin_candidate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidateQuery>,
) -> GameResult<Json<CandidateRound>> {
    let round_type = RoundType::from_param(query.round_type.as_deref());
    Ok(Json(state.select_candidate(round_type).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRoundRequest {
    #[serde(rename = "type", default)]
    pub round_type: Option<RoundType>,
}

/// Start a round. The body is optional and defaults to Guess Who.
///
/// POST /api/admin/start-round
pub async fn admin_start_round(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> GameResult<Response> {
    let req: StartRoundRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRoundRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| GameError::InvalidInput(format!("Invalid request body: {}", e)))?
    };

    let round = state
        .start_next_round(req.round_type.unwrap_or_default())
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "round": round })).into_response())
}

#[derive(Debug, Serialize)]
pub struct RevealResponse {
    pub success: bool,
    /// None when there was no active round to reveal
    pub result: Option<RevealPayload>,
}

/// End the active round early.
///
/// POST /api/admin/reveal
pub async fn admin_reveal(State(state): State<Arc<AppState>>) -> GameResult<Json<RevealResponse>> {
    let result = state.reveal_round().await?;
    Ok(Json(RevealResponse {
        success: true,
        result,
    }))
}

/// Leave the reveal screen before its timer runs out.
///
/// POST /api/admin/skip-to-reel
pub async fn admin_skip_to_reel(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let returned = state.return_to_reel().await;
    Json(serde_json::json!({ "success": true, "returned": returned }))
}

/// Delete players, answers, rounds, votes and scores.
///
/// POST /api/admin/reset
pub async fn admin_reset(State(state): State<Arc<AppState>>) -> GameResult<Json<serde_json::Value>> {
    state.reset_game().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Export the entire store as JSON.
///
/// GET /api/admin/export
pub async fn admin_export(State(state): State<Arc<AppState>>) -> GameResult<Json<StoreSnapshot>> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot))
}

/// Build the full application router
pub fn router(state: Arc<AppState>, static_dir: impl AsRef<Path>) -> Router {
    let admin_routes = Router::new()
        .route("/verify", get(admin_verify))
        .route("/stats", get(admin_stats))
        .route("/submissions", get(admin_submissions))
        .route("/candidate", get(admin_candidate))
        .route("/start-round", post(admin_start_round))
        .route("/reveal", post(admin_reveal))
        .route("/skip-to-reel", post(admin_skip_to_reel))
        .route("/reset", post(admin_reset))
        .route("/export", get(admin_export))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/state", get(get_state))
        .route("/join", post(join))
        .route("/submit", post(submit))
        .route("/vote", post(vote))
        .route("/scores", get(scores))
        .route("/prompts", get(prompts))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GameError::InvalidCredential.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(GameError::AlreadyVoted.status_code(), StatusCode::CONFLICT);
        assert_eq!(GameError::OwnSubmission.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GameError::InvalidInput("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_cookie_format() {
        let c = cookie(SESSION_COOKIE, "abc");
        assert!(c.starts_with("session_token=abc;"));
        assert!(c.contains("HttpOnly"));
        assert!(c.contains("SameSite=Lax"));
    }

    #[test]
    fn test_start_round_body_type_field() {
        let req: StartRoundRequest = serde_json::from_str(r#"{"type":"GUESS_WHAT"}"#).unwrap();
        assert_eq!(req.round_type, Some(RoundType::GuessWhat));
        let req: StartRoundRequest = serde_json::from_str("{}").unwrap();
        assert!(req.round_type.is_none());
    }
}
