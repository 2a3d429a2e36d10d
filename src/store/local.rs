use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{GameStore, StoreData, StoreError, StoreResult, StoreSnapshot};
use crate::types::*;

/// Store kept in process memory, optionally mirrored to a JSON snapshot file.
///
/// With a snapshot path every mutation is applied to a staged copy, written to
/// disk, and only then swapped in. A failed write leaves the live data as it
/// was before the call.
#[derive(Debug)]
pub struct LocalStore {
    data: RwLock<StoreData>,
    snapshot_path: Option<PathBuf>,
}

impl LocalStore {
    /// Volatile store seeded with the default prompts
    pub fn in_memory() -> Self {
        let mut data = StoreData::default();
        data.seed_default_prompts();
        Self {
            data: RwLock::new(data),
            snapshot_path: None,
        }
    }

    /// Open (or create) a file-backed store
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut data = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                snapshot.validate().map_err(StoreError::Serialization)?;
                tracing::info!(
                    "Loaded snapshot from {} ({} players, {} submissions)",
                    path.display(),
                    snapshot.data.players.len(),
                    snapshot.data.submissions.len()
                );
                snapshot.data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting fresh", path.display());
                StoreData::default()
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let seeded = data.seed_default_prompts();
        if seeded {
            write_snapshot(&path, &data).await?;
        }

        Ok(Self {
            data: RwLock::new(data),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> StoreResult<T> {
        let data = self.data.read().await;
        Ok(f(&data))
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut data = self.data.write().await;
        match &self.snapshot_path {
            None => f(&mut data),
            Some(path) => {
                let mut staged = data.clone();
                let out = f(&mut staged)?;
                write_snapshot(path, &staged).await?;
                *data = staged;
                Ok(out)
            }
        }
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_snapshot(path: &Path, data: &StoreData) -> StoreResult<()> {
    let snapshot = StoreSnapshot::new(data.clone());
    let json = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl GameStore for LocalStore {
    async fn get_players(&self) -> StoreResult<Vec<Player>> {
        self.read(|d| d.players()).await
    }

    async fn get_player(&self, id: &str) -> StoreResult<Option<Player>> {
        self.read(|d| d.players.get(id).cloned()).await
    }

    async fn find_player_by_name(&self, name: &str) -> StoreResult<Option<Player>> {
        self.read(|d| d.find_player_by_name(name)).await
    }

    async fn insert_player(&self, player: Player) -> StoreResult<()> {
        self.mutate(|d| d.insert_player(player)).await
    }

    async fn update_player(&self, player: Player) -> StoreResult<()> {
        self.mutate(|d| d.update_player(player)).await
    }

    async fn touch_player(&self, id: &str, seen_at: &str) -> StoreResult<()> {
        self.mutate(|d| d.touch_player(id, seen_at)).await
    }

    async fn insert_session(&self, session: Session) -> StoreResult<()> {
        self.mutate(|d| d.insert_session(session)).await
    }

    async fn get_player_by_session_token(&self, token: &str) -> StoreResult<Option<Player>> {
        self.read(|d| d.player_by_session_token(token)).await
    }

    async fn get_prompts_ordered(&self) -> StoreResult<Vec<Prompt>> {
        self.read(|d| d.prompts_ordered()).await
    }

    async fn get_prompt(&self, id: &str) -> StoreResult<Option<Prompt>> {
        self.read(|d| d.prompts.get(id).cloned()).await
    }

    async fn get_submissions(&self) -> StoreResult<Vec<Submission>> {
        self.read(|d| d.submissions()).await
    }

    async fn get_unused_submissions(&self) -> StoreResult<Vec<Submission>> {
        self.read(|d| d.unused_submissions()).await
    }

    async fn get_submissions_by_player(&self, player_id: &str) -> StoreResult<Vec<Submission>> {
        self.read(|d| d.submissions_by_player(player_id)).await
    }

    async fn upsert_submission(
        &self,
        prompt_id: &str,
        player_id: &str,
        answer_text: String,
        context_text: Option<String>,
    ) -> StoreResult<Submission> {
        self.mutate(|d| d.upsert_submission(prompt_id, player_id, answer_text, context_text))
            .await
    }

    async fn mark_submission_used(&self, id: &str) -> StoreResult<()> {
        self.mutate(|d| d.mark_submission_used(id)).await
    }

    async fn reset_all_submissions_unused(&self) -> StoreResult<usize> {
        self.mutate(|d| Ok(d.reset_all_submissions_unused())).await
    }

    async fn upsert_round_record(&self, round: Round) -> StoreResult<()> {
        self.mutate(|d| {
            d.upsert_round_record(round);
            Ok(())
        })
        .await
    }

    async fn begin_round(&self, round: Round) -> StoreResult<()> {
        self.mutate(|d| d.begin_round(round)).await
    }

    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>> {
        self.read(|d| d.rounds.get(id).cloned()).await
    }

    async fn insert_vote(&self, vote: Vote) -> StoreResult<()> {
        self.mutate(|d| d.insert_vote(vote)).await
    }

    async fn get_votes_for_round(&self, round_id: &str) -> StoreResult<Vec<Vote>> {
        self.read(|d| d.votes_for_round(round_id)).await
    }

    async fn init_score(&self, player_id: &str) -> StoreResult<()> {
        self.mutate(|d| {
            d.init_score(player_id);
            Ok(())
        })
        .await
    }

    async fn increment_score(&self, player_id: &str, delta: u32) -> StoreResult<u32> {
        self.mutate(|d| Ok(d.increment_score(player_id, delta)))
            .await
    }

    async fn get_scores_descending(&self) -> StoreResult<Vec<ScoreEntry>> {
        self.read(|d| d.scores_descending()).await
    }

    async fn commit_reveal(
        &self,
        round_id: &str,
        revealed_at: &str,
        awarded: &[PlayerId],
    ) -> StoreResult<()> {
        self.mutate(|d| d.commit_reveal(round_id, revealed_at, awarded))
            .await
    }

    async fn reset_game_data(&self) -> StoreResult<()> {
        self.mutate(|d| {
            d.reset_game_data();
            Ok(())
        })
        .await
    }

    async fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        self.read(|d| StoreSnapshot::new(d.clone())).await
    }
}
