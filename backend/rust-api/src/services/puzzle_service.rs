use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::puzzle::{
    DailyPuzzleResponse, ImagePair, ListPuzzlesQuery, PairStatus, PlayablePair, PuzzleAdminView,
    SchedulePairRequest, PAIRS_PER_PUZZLE,
};
use crate::models::DateKey;
use crate::stores::PuzzleStore;
use crate::utils::clock;

pub struct PuzzleService {
    puzzles: Arc<dyn PuzzleStore>,
}

impl PuzzleService {
    pub fn new(puzzles: Arc<dyn PuzzleStore>) -> Self {
        Self { puzzles }
    }

    /// Today's puzzle as served to players. A partially scheduled day reads
    /// the same as an unscheduled one.
    pub async fn daily_puzzle(&self, now: DateTime<Utc>) -> Result<DailyPuzzleResponse, ApiError> {
        let today = clock::date_key_at(now);
        let image_pairs = self.playable_pairs(today).await?;
        Ok(DailyPuzzleResponse {
            date: today,
            image_pairs,
        })
    }

    /// Grading source of truth for a date; the session flow loads pairs here.
    pub async fn playable_pairs(&self, date: DateKey) -> Result<Vec<PlayablePair>, ApiError> {
        let day = self
            .puzzles
            .get(date)
            .await?
            .ok_or_else(ApiError::puzzle_unavailable)?;
        day.playable_pairs()
            .ok_or_else(ApiError::puzzle_unavailable)
    }

    /// Overwrite one pair slot for today or a future date. Past days are
    /// immutable.
    pub async fn schedule_pair(
        &self,
        date: DateKey,
        pair_index: usize,
        req: SchedulePairRequest,
        now: DateTime<Utc>,
    ) -> Result<PuzzleAdminView, ApiError> {
        let today = clock::date_key_at(now);
        if date < today {
            return Err(ApiError::validation(format!(
                "Cannot schedule pairs for past date {}",
                date
            )));
        }
        if pair_index >= PAIRS_PER_PUZZLE {
            return Err(ApiError::validation(format!(
                "pairIndex must be less than {}, got {}",
                PAIRS_PER_PUZZLE, pair_index
            )));
        }

        let pair = ImagePair {
            human_image_url: Some(req.human_image_url),
            ai_image_url: Some(req.ai_image_url),
            status: PairStatus::Approved,
        };
        let day = self.puzzles.upsert_pair(date, pair_index, pair, now).await?;

        tracing::info!(date = %date, pair_index, "Scheduled puzzle pair");
        Ok(PuzzleAdminView::from_day(&day, today))
    }

    /// Admin projection of one day; partial days are visible here.
    pub async fn admin_view(
        &self,
        date: DateKey,
        now: DateTime<Utc>,
    ) -> Result<PuzzleAdminView, ApiError> {
        let today = clock::date_key_at(now);
        let day = self
            .puzzles
            .get(date)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("No puzzle scheduled for {}", date)))?;
        Ok(PuzzleAdminView::from_day(&day, today))
    }

    pub async fn list(
        &self,
        query: ListPuzzlesQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<PuzzleAdminView>, ApiError> {
        if query.from > query.to {
            return Err(ApiError::validation("'from' must not be after 'to'"));
        }
        let today = clock::date_key_at(now);
        let days = self.puzzles.list(query.from, query.to).await?;
        Ok(days
            .iter()
            .map(|day| PuzzleAdminView::from_day(day, today))
            .collect())
    }

    /// Future days only. A live or past day never loses its puzzle.
    pub async fn delete(&self, date: DateKey, now: DateTime<Utc>) -> Result<(), ApiError> {
        let today = clock::date_key_at(now);
        if date <= today {
            return Err(ApiError::validation(format!(
                "Only future puzzles can be deleted; {} has already started",
                date
            )));
        }
        let removed = self.puzzles.delete(date).await?;
        if !removed {
            return Err(ApiError::not_found(format!(
                "No puzzle scheduled for {}",
                date
            )));
        }
        tracing::info!(date = %date, "Deleted scheduled puzzle");
        Ok(())
    }
}
