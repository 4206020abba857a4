use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::puzzle::{present_pairs, PlayablePair, PresentedPair, SideOrder, PAIRS_PER_PUZZLE};
use super::DateKey;

/// Wrong submits a player may make before the day is lost.
pub const MAX_TRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Won,
    Lost,
}

impl SessionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, SessionStatus::Won | SessionStatus::Lost)
    }
}

/// One recorded choice. `was_human_choice` is always recomputed server-side
/// against the scheduled pair; client-supplied flags are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selected_image_url: String,
    pub was_human_choice: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("selection index {index} is out of range")]
    InvalidSlot { index: usize },
    #[error("at most {} selections are allowed, got {count}", PAIRS_PER_PUZZLE)]
    TooManySelections { count: usize },
    #[error("all {} pairs need a selection before submit", PAIRS_PER_PUZZLE)]
    IncompleteSelections,
    #[error("today's puzzle is already complete")]
    AlreadyComplete,
}

/// Result of a submit, also reconstructed for terminal re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub status: SessionStatus,
    pub correct_count: u32,
    pub tries_remaining: u32,
}

impl SubmitOutcome {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// One player's attempt state for one calendar day. Guests and authenticated
/// players share this structure; only the backing store differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub is_guest: bool,
    pub date: DateKey,
    /// Left/right orientation drawn at session start, one entry per pair.
    pub pair_order: Vec<SideOrder>,
    pub selections: Vec<Option<Selection>>,
    pub tries_remaining: u32,
    pub status: SessionStatus,
    /// Set once the statistics engine has accepted this completion.
    pub stats_recorded: bool,
    pub version: i64,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl PlayerSession {
    pub fn session_id(owner_id: &str, date: DateKey) -> String {
        format!("{owner_id}:{date}")
    }

    pub fn start(
        owner_id: &str,
        is_guest: bool,
        date: DateKey,
        pair_order: Vec<SideOrder>,
        now: DateTime<Utc>,
    ) -> Self {
        PlayerSession {
            id: Self::session_id(owner_id, date),
            owner_id: owner_id.to_string(),
            is_guest,
            date,
            pair_order,
            selections: vec![None; PAIRS_PER_PUZZLE],
            tries_remaining: MAX_TRIES,
            status: SessionStatus::NotStarted,
            stats_recorded: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn is_submit_enabled(&self) -> bool {
        self.selections.len() == PAIRS_PER_PUZZLE && self.selections.iter().all(Option::is_some)
    }

    /// Correct choices among the filled slots. Valid at any point because the
    /// flags are recomputed whenever a selection is written.
    pub fn correct_selection_count(&self) -> u32 {
        self.selections
            .iter()
            .flatten()
            .filter(|s| s.was_human_choice)
            .count() as u32
    }

    /// Overwrite one slot. Never consumes a try; selections stay editable
    /// until the day is complete.
    pub fn record_selection(
        &mut self,
        index: usize,
        selection: Selection,
    ) -> Result<(), SessionError> {
        if self.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        if index >= PAIRS_PER_PUZZLE {
            return Err(SessionError::InvalidSlot { index });
        }
        self.selections[index] = Some(selection);
        if self.status == SessionStatus::NotStarted {
            self.status = SessionStatus::InProgress;
        }
        Ok(())
    }

    /// Replace the whole selections array (the bulk persistence endpoint).
    /// Shorter arrays are padded with empty slots.
    pub fn replace_selections(
        &mut self,
        selections: Vec<Option<Selection>>,
    ) -> Result<(), SessionError> {
        if self.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        if selections.len() > PAIRS_PER_PUZZLE {
            return Err(SessionError::TooManySelections {
                count: selections.len(),
            });
        }
        let mut padded = selections;
        padded.resize(PAIRS_PER_PUZZLE, None);
        let any_filled = padded.iter().any(Option::is_some);
        self.selections = padded;
        if any_filled && self.status == SessionStatus::NotStarted {
            self.status = SessionStatus::InProgress;
        }
        Ok(())
    }

    /// Grade the filled board against the day's pairs and advance the state
    /// machine: 5/5 wins, anything less costs a try, the third wrong submit
    /// loses the day.
    pub fn submit(&mut self, pairs: &[PlayablePair]) -> Result<SubmitOutcome, SessionError> {
        if self.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        if !self.is_submit_enabled() {
            return Err(SessionError::IncompleteSelections);
        }
        for (slot, pair) in self.selections.iter_mut().zip(pairs.iter()) {
            if let Some(selection) = slot {
                selection.was_human_choice = selection.selected_image_url == pair.human;
            }
        }
        let correct_count = self.correct_selection_count();
        if correct_count as usize == PAIRS_PER_PUZZLE {
            self.status = SessionStatus::Won;
        } else {
            self.tries_remaining = self.tries_remaining.saturating_sub(1);
            self.status = if self.tries_remaining == 0 {
                SessionStatus::Lost
            } else {
                SessionStatus::InProgress
            };
        }
        Ok(SubmitOutcome {
            status: self.status,
            correct_count,
            tries_remaining: self.tries_remaining,
        })
    }

    /// Terminal state reconstructed for re-entry. `None` while still playable.
    pub fn outcome(&self) -> Option<SubmitOutcome> {
        if !self.is_complete() {
            return None;
        }
        Some(SubmitOutcome {
            status: self.status,
            correct_count: self.correct_selection_count(),
            tries_remaining: self.tries_remaining,
        })
    }

    /// Client-driven try consumption. Clamps at zero; the third consumed try
    /// loses the day.
    pub fn decrement_tries(&mut self) -> u32 {
        if self.is_complete() {
            return self.tries_remaining;
        }
        self.tries_remaining = self.tries_remaining.saturating_sub(1);
        if self.tries_remaining == 0 {
            self.status = SessionStatus::Lost;
        } else if self.status == SessionStatus::NotStarted {
            self.status = SessionStatus::InProgress;
        }
        self.tries_remaining
    }

    /// Restore the full try budget. A completed day stays completed; the next
    /// date key starts fresh at the maximum anyway.
    pub fn reset_tries(&mut self) -> u32 {
        if !self.is_complete() {
            self.tries_remaining = MAX_TRIES;
        }
        self.tries_remaining
    }
}

/// Body of `POST /game/session/select`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub pair_index: usize,
    #[validate(length(min = 1, message = "selectedImageUrl must not be empty"))]
    pub selected_image_url: String,
}

/// One slot of the bulk selections payload. Only the chosen URL is trusted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInput {
    pub selected_image_url: String,
}

/// Body of `PUT /stats/selections`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSelectionsRequest {
    pub selections: Vec<Option<SelectionInput>>,
}

/// Body of the submit response. Unlike [`SessionView`], the correct count is
/// always present, including on a wrong submit with tries left.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: SessionStatus,
    pub correct_count: u32,
    pub tries_remaining: u32,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        SubmitResponse {
            status: outcome.status,
            correct_count: outcome.correct_count,
            tries_remaining: outcome.tries_remaining,
        }
    }
}

/// Session as served to the client: the presented board plus progress, never
/// the answer key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub date: DateKey,
    pub status: SessionStatus,
    pub image_pairs: Vec<PresentedPair>,
    pub selections: Vec<Option<Selection>>,
    pub tries_remaining: u32,
    pub submit_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_count: Option<u32>,
}

impl SessionView {
    pub fn build(session: &PlayerSession, pairs: &[PlayablePair]) -> Self {
        SessionView {
            date: session.date,
            status: session.status,
            image_pairs: present_pairs(pairs, &session.pair_order),
            selections: session.selections.clone(),
            tries_remaining: session.tries_remaining,
            submit_enabled: session.is_submit_enabled(),
            correct_count: session.outcome().map(|o| o.correct_count),
        }
    }
}
