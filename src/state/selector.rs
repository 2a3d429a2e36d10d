//! Round candidate selection.
//!
//! The choice itself is a pure function over already loaded rows so it can be
//! driven by a seeded RNG in tests. `AppState::select_candidate` loads the
//! rows and handles recycling of used submissions.

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{AppState, Engine};
use crate::error::{GameError, GameResult};
use crate::types::*;

/// A fully built round that hasn't started yet
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CandidateRound {
    pub round_type: RoundType,
    pub prompt: PromptRef,
    pub submission_id: SubmissionId,
    pub author_player_id: PlayerId,
    pub options: Vec<RoundOption>,
    pub correct_option_id: OptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_person: Option<ShownPerson>,
}

impl CandidateRound {
    pub fn into_round(self, id: RoundId, started_at: String, deadline_at: String) -> Round {
        Round {
            id,
            round_type: self.round_type,
            prompt: self.prompt,
            submission_id: self.submission_id,
            author_player_id: self.author_player_id,
            status: RoundStatus::Active,
            options: self.options,
            correct_option_id: self.correct_option_id,
            show_answer: self.show_answer,
            show_person: self.show_person,
            started_at: Some(started_at),
            deadline_at: Some(deadline_at),
            revealed_at: None,
        }
    }
}

fn new_option_id() -> OptionId {
    ulid::Ulid::new().to_string()
}

fn prompt_ref(prompts: &[Prompt], prompt_id: &str) -> GameResult<PromptRef> {
    prompts
        .iter()
        .find(|p| p.id == prompt_id)
        .map(|p| PromptRef {
            id: p.id.clone(),
            text: p.text.clone(),
        })
        .ok_or_else(|| GameError::NotFound(format!("prompt {}", prompt_id)))
}

fn find_player<'a>(players: &'a [Player], player_id: &str) -> GameResult<&'a Player> {
    players
        .iter()
        .find(|p| p.id == player_id)
        .ok_or_else(|| GameError::NotFound(format!("player {}", player_id)))
}

fn person_option(player: &Player, is_correct: bool) -> RoundOption {
    RoundOption {
        id: new_option_id(),
        player_id: Some(player.id.clone()),
        name: Some(player.display_name.clone()),
        emoji: Some(player.emoji.clone()),
        text: None,
        is_correct,
    }
}

fn answer_option(submission: &Submission, is_correct: bool) -> RoundOption {
    RoundOption {
        id: new_option_id(),
        player_id: None,
        name: None,
        emoji: None,
        text: Some(submission.answer_text.clone()),
        is_correct,
    }
}

/// Build a candidate from the unused pool.
///
/// Guess Who shows an answer and offers its author plus three other players.
/// Guess What shows a person and offers their answer plus three other answers
/// to the same prompt.
pub fn select_from_pool<R: Rng + ?Sized>(
    round_type: RoundType,
    unused: &[Submission],
    players: &[Player],
    prompts: &[Prompt],
    rng: &mut R,
) -> GameResult<CandidateRound> {
    match round_type {
        RoundType::GuessWho => select_guess_who(unused, players, prompts, rng),
        RoundType::GuessWhat => select_guess_what(unused, players, prompts, rng),
    }
}

fn select_guess_who<R: Rng + ?Sized>(
    unused: &[Submission],
    players: &[Player],
    prompts: &[Prompt],
    rng: &mut R,
) -> GameResult<CandidateRound> {
    if players.len() < MIN_PLAYERS_FOR_GUESS_WHO {
        return Err(GameError::InsufficientPlayers);
    }

    let target = unused
        .choose(rng)
        .ok_or(GameError::InsufficientSubmissions)?;
    let author = find_player(players, &target.player_id)?;

    let others: Vec<&Player> = players.iter().filter(|p| p.id != author.id).collect();
    if others.len() < DECOY_COUNT {
        return Err(GameError::InsufficientPlayers);
    }

    let mut options = vec![person_option(author, true)];
    options.extend(
        others
            .choose_multiple(rng, DECOY_COUNT)
            .map(|p| person_option(p, false)),
    );
    let correct_option_id = options[0].id.clone();
    options.shuffle(rng);

    Ok(CandidateRound {
        round_type: RoundType::GuessWho,
        prompt: prompt_ref(prompts, &target.prompt_id)?,
        submission_id: target.id.clone(),
        author_player_id: author.id.clone(),
        options,
        correct_option_id,
        show_answer: Some(target.answer_text.clone()),
        show_person: None,
    })
}

fn select_guess_what<R: Rng + ?Sized>(
    unused: &[Submission],
    players: &[Player],
    prompts: &[Prompt],
    rng: &mut R,
) -> GameResult<CandidateRound> {
    // BTreeMap keeps iteration order stable for seeded selection
    let mut by_prompt: BTreeMap<&str, Vec<&Submission>> = BTreeMap::new();
    for submission in unused {
        by_prompt
            .entry(submission.prompt_id.as_str())
            .or_default()
            .push(submission);
    }

    let eligible: Vec<&Vec<&Submission>> = by_prompt
        .values()
        .filter(|subs| subs.len() >= MIN_SUBMISSIONS_FOR_GUESS_WHAT)
        .collect();
    let pool = eligible
        .choose(rng)
        .ok_or(GameError::InsufficientSubmissions)?;

    let target = *pool.choose(rng).ok_or(GameError::InsufficientSubmissions)?;
    let author = find_player(players, &target.player_id)?;

    let decoys: Vec<&Submission> = pool
        .iter()
        .copied()
        .filter(|s| s.id != target.id)
        .collect();

    let mut options = vec![answer_option(target, true)];
    options.extend(
        decoys
            .choose_multiple(rng, DECOY_COUNT)
            .map(|s| answer_option(s, false)),
    );
    let correct_option_id = options[0].id.clone();
    options.shuffle(rng);

    Ok(CandidateRound {
        round_type: RoundType::GuessWhat,
        prompt: prompt_ref(prompts, &target.prompt_id)?,
        submission_id: target.id.clone(),
        author_player_id: author.id.clone(),
        options,
        correct_option_id,
        show_answer: None,
        show_person: Some(ShownPerson {
            name: author.display_name.clone(),
            emoji: author.emoji.clone(),
        }),
    })
}

impl AppState {
    /// Pick the next round without starting it.
    ///
    /// When every submission has been used the flags are reset once and the
    /// whole pool becomes eligible again.
    pub async fn select_candidate(&self, round_type: RoundType) -> GameResult<CandidateRound> {
        let engine = self.engine.lock().await;
        self.select_candidate_locked(&engine, round_type).await
    }

    pub(crate) async fn select_candidate_locked(
        &self,
        _engine: &Engine,
        round_type: RoundType,
    ) -> GameResult<CandidateRound> {
        let players = self.store.get_players().await?;
        if round_type == RoundType::GuessWho && players.len() < MIN_PLAYERS_FOR_GUESS_WHO {
            return Err(GameError::InsufficientPlayers);
        }

        let mut unused = self.store.get_unused_submissions().await?;
        if unused.is_empty() {
            let cleared = self.store.reset_all_submissions_unused().await?;
            if cleared > 0 {
                tracing::info!("All submissions used, recycled {} of them", cleared);
            }
            unused = self.store.get_unused_submissions().await?;
        }
        if unused.is_empty() {
            return Err(GameError::InsufficientSubmissions);
        }

        let prompts = self.store.get_prompts_ordered().await?;

        let candidate = select_from_pool(round_type, &unused, &players, &prompts, &mut rand::rng())?;
        tracing::debug!(
            "Selected {:?} candidate from submission {}",
            candidate.round_type,
            candidate.submission_id
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            display_name: format!("Name {}", id),
            emoji: "🎈".to_string(),
            created_at: now_rfc3339(),
            last_seen_at: now_rfc3339(),
        }
    }

    fn prompt(id: &str) -> Prompt {
        Prompt {
            id: id.to_string(),
            text: format!("Prompt {}", id),
            category: PromptCategory::Core,
            order_index: 1,
        }
    }

    fn submission(id: &str, prompt_id: &str, player_id: &str) -> Submission {
        Submission {
            id: id.to_string(),
            prompt_id: prompt_id.to_string(),
            player_id: player_id.to_string(),
            answer_text: format!("answer {}", id),
            context_text: None,
            is_used_in_round: false,
            created_at: now_rfc3339(),
        }
    }

    fn assert_well_formed(candidate: &CandidateRound) {
        assert_eq!(candidate.options.len(), OPTION_COUNT);
        let correct: Vec<_> = candidate.options.iter().filter(|o| o.is_correct).collect();
        assert_eq!(correct.len(), 1);
        assert_eq!(correct[0].id, candidate.correct_option_id);
        let ids: HashSet<_> = candidate.options.iter().map(|o| &o.id).collect();
        assert_eq!(ids.len(), OPTION_COUNT);
    }

    #[test]
    fn test_guess_who_decoys_exclude_author() {
        let players: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| player(id)).collect();
        let prompts = vec![prompt("p1")];
        // Only two of the four players answered
        let unused = vec![submission("s1", "p1", "a"), submission("s2", "p1", "b")];

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidate =
                select_from_pool(RoundType::GuessWho, &unused, &players, &prompts, &mut rng)
                    .unwrap();
            assert_well_formed(&candidate);

            let author = &candidate.author_player_id;
            let author_options = candidate
                .options
                .iter()
                .filter(|o| o.player_id.as_ref() == Some(author))
                .count();
            assert_eq!(author_options, 1);

            let correct = candidate
                .options
                .iter()
                .find(|o| o.is_correct)
                .unwrap();
            assert_eq!(correct.player_id.as_ref(), Some(author));
            assert!(candidate.show_answer.is_some());
            assert!(candidate.show_person.is_none());
        }
    }

    #[test]
    fn test_guess_who_needs_four_players() {
        let players: Vec<_> = ["a", "b", "c"].iter().map(|id| player(id)).collect();
        let unused = vec![submission("s1", "p1", "a")];
        let mut rng = StdRng::seed_from_u64(1);
        let result = select_from_pool(
            RoundType::GuessWho,
            &unused,
            &players,
            &[prompt("p1")],
            &mut rng,
        );
        assert!(matches!(result, Err(GameError::InsufficientPlayers)));
    }

    #[test]
    fn test_guess_what_needs_four_answers_on_one_prompt() {
        let players: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| player(id)).collect();
        let prompts = vec![prompt("p1"), prompt("p2")];
        let unused = vec![
            submission("s1", "p1", "a"),
            submission("s2", "p1", "b"),
            submission("s3", "p1", "c"),
            submission("s4", "p2", "d"),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let result =
            select_from_pool(RoundType::GuessWhat, &unused, &players, &prompts, &mut rng);
        assert!(matches!(result, Err(GameError::InsufficientSubmissions)));
    }

    #[test]
    fn test_guess_what_uses_one_prompt() {
        let players: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| player(id))
            .collect();
        let prompts = vec![prompt("p1"), prompt("p2")];
        let mut unused: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|pid| submission(&format!("p1-{}", pid), "p1", pid))
            .collect();
        unused.push(submission("p2-a", "p2", "a"));

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidate =
                select_from_pool(RoundType::GuessWhat, &unused, &players, &prompts, &mut rng)
                    .unwrap();
            assert_well_formed(&candidate);
            assert_eq!(candidate.prompt.id, "p1");

            let texts: HashSet<_> = candidate
                .options
                .iter()
                .map(|o| o.text.clone().unwrap())
                .collect();
            assert_eq!(texts.len(), OPTION_COUNT);
            assert!(texts.iter().all(|t| t.starts_with("answer p1-")));

            let shown = candidate.show_person.as_ref().unwrap();
            let author = players
                .iter()
                .find(|p| p.id == candidate.author_player_id)
                .unwrap();
            assert_eq!(shown.name, author.display_name);
        }
    }

    #[test]
    fn test_empty_pool() {
        let players: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| player(id)).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let result = select_from_pool(RoundType::GuessWho, &[], &players, &[], &mut rng);
        assert!(matches!(result, Err(GameError::InsufficientSubmissions)));
    }

    #[tokio::test]
    async fn test_select_candidate_recycles_used_pool() {
        let state = AppState::default();
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D"] {
            ids.push(state.join_player(name, "🎲", None).await.unwrap().player.id);
        }
        let prompts = state.store.get_prompts_ordered().await.unwrap();
        let sub = state
            .submit_answer(&ids[0], &prompts[0].id, "only answer", None)
            .await
            .unwrap();
        state.store.mark_submission_used(&sub.id).await.unwrap();

        let candidate = state.select_candidate(RoundType::GuessWho).await.unwrap();
        assert_eq!(candidate.submission_id, sub.id);
        assert_eq!(state.store.get_unused_submissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_select_candidate_without_submissions() {
        let state = AppState::default();
        for name in ["A", "B", "C", "D"] {
            state.join_player(name, "🎲", None).await.unwrap();
        }
        let result = state.select_candidate(RoundType::GuessWho).await;
        assert!(matches!(result, Err(GameError::InsufficientSubmissions)));
        let result = state.select_candidate(RoundType::GuessWhat).await;
        assert!(matches!(result, Err(GameError::InsufficientSubmissions)));
    }

    #[tokio::test]
    async fn test_guess_who_player_count_checked_first() {
        let state = AppState::default();
        let result = state.select_candidate(RoundType::GuessWho).await;
        assert!(matches!(result, Err(GameError::InsufficientPlayers)));

        for name in ["A", "B", "C"] {
            state.join_player(name, "🎲", None).await.unwrap();
        }
        let result = state.select_candidate(RoundType::GuessWho).await;
        assert!(matches!(result, Err(GameError::InsufficientPlayers)));
    }

    #[tokio::test]
    async fn test_select_candidate_waits_for_engine() {
        let state = std::sync::Arc::new(AppState::default());
        for name in ["A", "B", "C", "D"] {
            let id = state.join_player(name, "🎲", None).await.unwrap().player.id;
            let prompts = state.store.get_prompts_ordered().await.unwrap();
            state
                .submit_answer(&id, &prompts[0].id, "answer", None)
                .await
                .unwrap();
        }

        let engine = state.engine.lock().await;
        let preview = tokio::spawn({
            let state = state.clone();
            async move { state.select_candidate(RoundType::GuessWho).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!preview.is_finished());

        drop(engine);
        assert!(preview.await.unwrap().is_ok());
    }
}
