use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::DateKey;

/// Every daily puzzle carries exactly this many image pairs.
pub const PAIRS_PER_PUZZLE: usize = 5;

/// Editorial status of a scheduled pair. `Live` is never stored: it is
/// computed at read time once the scheduled date arrives, so no background
/// sweep ever has to promote documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Pending,
    Approved,
    Live,
}

/// One human/AI image pair slot inside a daily puzzle. Image fields hold
/// opaque URL references; the API never touches image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_image_url: Option<String>,
    pub status: PairStatus,
}

impl ImagePair {
    pub fn empty() -> Self {
        ImagePair {
            human_image_url: None,
            ai_image_url: None,
            status: PairStatus::Pending,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.human_image_url.is_some() && self.ai_image_url.is_some()
    }

    pub fn effective_status(&self, scheduled_for: DateKey, today: DateKey) -> PairStatus {
        if self.is_complete() && scheduled_for <= today {
            PairStatus::Live
        } else {
            self.status
        }
    }
}

/// Puzzle document stored in the "puzzles" collection, keyed by date string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleDay {
    #[serde(rename = "_id")]
    pub date: DateKey,
    pub pairs: Vec<ImagePair>,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl PuzzleDay {
    /// Fresh document with all five slots empty.
    pub fn skeleton(date: DateKey, now: DateTime<Utc>) -> Self {
        PuzzleDay {
            date,
            pairs: vec![ImagePair::empty(); PAIRS_PER_PUZZLE],
            created_at: now,
            updated_at: now,
        }
    }

    /// A puzzle is servable only when every one of its five slots has both
    /// image references. A partially scheduled day is indistinguishable from
    /// an unscheduled one to players.
    pub fn is_playable(&self) -> bool {
        self.pairs.len() == PAIRS_PER_PUZZLE && self.pairs.iter().all(ImagePair::is_complete)
    }

    /// Projection of a fully scheduled puzzle into the plain pair list the
    /// game endpoints serve. `None` while any slot is incomplete.
    pub fn playable_pairs(&self) -> Option<Vec<PlayablePair>> {
        if !self.is_playable() {
            return None;
        }
        let pairs = self
            .pairs
            .iter()
            .filter_map(|pair| {
                Some(PlayablePair {
                    human: pair.human_image_url.clone()?,
                    ai: pair.ai_image_url.clone()?,
                })
            })
            .collect();
        Some(pairs)
    }
}

/// Complete pair as served to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayablePair {
    pub human: String,
    pub ai: String,
}

/// Per-pair left/right orientation, drawn once per session and persisted so
/// re-rendering never reshuffles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideOrder {
    HumanLeft,
    HumanRight,
}

/// Independent unbiased coin flip per pair.
pub fn draw_side_orders<R: Rng>(rng: &mut R, count: usize) -> Vec<SideOrder> {
    (0..count)
        .map(|_| {
            if rng.random_bool(0.5) {
                SideOrder::HumanLeft
            } else {
                SideOrder::HumanRight
            }
        })
        .collect()
}

/// One pair the way the client renders it: two images, no answer key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedPair {
    pub index: usize,
    pub left: String,
    pub right: String,
}

/// Apply a persisted orientation vector to the day's pairs.
pub fn present_pairs(pairs: &[PlayablePair], order: &[SideOrder]) -> Vec<PresentedPair> {
    pairs
        .iter()
        .zip(order.iter())
        .enumerate()
        .map(|(index, (pair, side))| match side {
            SideOrder::HumanLeft => PresentedPair {
                index,
                left: pair.human.clone(),
                right: pair.ai.clone(),
            },
            SideOrder::HumanRight => PresentedPair {
                index,
                left: pair.ai.clone(),
                right: pair.human.clone(),
            },
        })
        .collect()
}

/// Body of `GET /game/daily-puzzle`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPuzzleResponse {
    pub date: DateKey,
    pub image_pairs: Vec<PlayablePair>,
}

/// Body of `PUT /admin/puzzles/{date}/pairs/{index}`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePairRequest {
    #[validate(url(message = "humanImageUrl must be a valid URL"))]
    pub human_image_url: String,
    #[validate(url(message = "aiImageUrl must be a valid URL"))]
    pub ai_image_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairAdminView {
    pub index: usize,
    pub human_image_url: Option<String>,
    pub ai_image_url: Option<String>,
    pub status: PairStatus,
    pub is_complete: bool,
}

/// Admin projection: partial days are visible here, with effective statuses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleAdminView {
    pub date: DateKey,
    pub pairs: Vec<PairAdminView>,
    pub is_playable: bool,
}

impl PuzzleAdminView {
    pub fn from_day(day: &PuzzleDay, today: DateKey) -> Self {
        let pairs = day
            .pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| PairAdminView {
                index,
                human_image_url: pair.human_image_url.clone(),
                ai_image_url: pair.ai_image_url.clone(),
                status: pair.effective_status(day.date, today),
                is_complete: pair.is_complete(),
            })
            .collect();
        PuzzleAdminView {
            date: day.date,
            pairs,
            is_playable: day.is_playable(),
        }
    }
}

/// Query params for `GET /admin/puzzles`.
#[derive(Debug, Deserialize)]
pub struct ListPuzzlesQuery {
    pub from: DateKey,
    pub to: DateKey,
}
