use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::metrics::COMPLETIONS_RECORDED_TOTAL;
use crate::models::puzzle::PAIRS_PER_PUZZLE;
use crate::models::stats::UserStats;
use crate::stores::{StatsStore, StoreError};
use crate::utils::clock;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub struct StatsService {
    stats: Arc<dyn StatsStore>,
}

impl StatsService {
    pub fn new(stats: Arc<dyn StatsStore>) -> Self {
        Self { stats }
    }

    /// A user who has never completed a puzzle reads as a zero-filled record.
    pub async fn get_or_default(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStats, ApiError> {
        let stats = self
            .stats
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserStats::zeroed(user_id, now));
        Ok(stats)
    }

    /// Fold one completed puzzle into the record: one atomic read-modify-write
    /// per call, retried on version conflicts. Recording twice for the same
    /// day returns the stored record unchanged.
    pub async fn record_completion(
        &self,
        user_id: &str,
        correct_answers: u32,
        total_questions: u32,
        now: DateTime<Utc>,
    ) -> Result<UserStats, ApiError> {
        if total_questions == 0 || total_questions > PAIRS_PER_PUZZLE as u32 {
            return Err(ApiError::validation(format!(
                "totalQuestions must be between 1 and {}",
                PAIRS_PER_PUZZLE
            )));
        }
        if correct_answers > total_questions {
            return Err(ApiError::validation(
                "correctAnswers must not exceed totalQuestions",
            ));
        }

        let (today, yesterday) = clock::day_pair_at(now);
        let aggressive_cfg = RetryConfig::aggressive();

        let (updated, applied) = retry_async_with_config(aggressive_cfg, || async {
            let current = self
                .stats
                .get(user_id)
                .await?
                .unwrap_or_else(|| UserStats::zeroed(user_id, now));

            // Same-day replay: nothing to write.
            if current.last_played_date == Some(today) {
                return Ok::<_, StoreError>((current, false));
            }

            let expected_version = current.version;
            let next =
                current.apply_completion(today, yesterday, correct_answers, total_questions, now);
            let stored = self.stats.put_versioned(&next, expected_version).await?;
            Ok((stored, true))
        })
        .await?;

        let outcome = if !applied {
            "replay"
        } else if correct_answers == total_questions {
            "perfect"
        } else {
            "imperfect"
        };
        COMPLETIONS_RECORDED_TOTAL
            .with_label_values(&[outcome])
            .inc();
        if applied {
            tracing::info!(
                user_id = %user_id,
                correct_answers,
                total_questions,
                current_streak = updated.current_streak,
                "Recorded puzzle completion"
            );
        }

        Ok(updated)
    }

    /// Explicit user action: overwrite with a zeroed record.
    pub async fn reset(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserStats, ApiError> {
        let aggressive_cfg = RetryConfig::aggressive();
        let zeroed = retry_async_with_config(aggressive_cfg, || async {
            let expected_version = self
                .stats
                .get(user_id)
                .await?
                .map(|s| s.version)
                .unwrap_or(0);
            let mut zeroed = UserStats::zeroed(user_id, now);
            zeroed.version = expected_version;
            self.stats.put_versioned(&zeroed, expected_version).await
        })
        .await?;

        tracing::info!(user_id = %user_id, "Reset user statistics");
        Ok(zeroed)
    }

    /// Explicit user action: drop the record entirely.
    pub async fn delete(&self, user_id: &str) -> Result<bool, ApiError> {
        let removed = self.stats.delete(user_id).await?;
        if removed {
            tracing::info!(user_id = %user_id, "Deleted user statistics");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStatsStore;
    use chrono::TimeZone;

    fn service() -> StatsService {
        StatsService::new(Arc::new(MemoryStatsStore::new()))
    }

    // Noon UTC keeps the Eastern date equal to the UTC date.
    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn unknown_user_reads_zeroed() {
        let svc = service();
        let stats = svc.get_or_default("u1", noon(2026, 5, 1)).await.unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.mistake_distribution.total(), 0);
        assert!(stats.last_played_date.is_none());
    }

    #[tokio::test]
    async fn first_completion_starts_the_streak() {
        let svc = service();
        let stats = svc
            .record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.perfect_puzzles, 1);
        assert_eq!(stats.win_percentage, 100);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.perfect_streak, 1);
        assert_eq!(stats.mistake_distribution.bucket(0), 1);
        assert_eq!(stats.most_recent_score, Some(0));
    }

    #[tokio::test]
    async fn consecutive_days_extend_streaks() {
        let svc = service();
        svc.record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        let stats = svc
            .record_completion("u1", 3, 5, noon(2026, 5, 2))
            .await
            .unwrap();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.current_streak, 2);
        // An imperfect day breaks the perfect streak only.
        assert_eq!(stats.perfect_streak, 0);
        assert_eq!(stats.max_perfect_streak, 1);
        assert_eq!(stats.win_percentage, 50);
        assert_eq!(stats.mistake_distribution.bucket(2), 1);
    }

    #[tokio::test]
    async fn missed_day_restarts_the_streak_at_one() {
        let svc = service();
        svc.record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        let stats = svc
            .record_completion("u1", 5, 5, noon(2026, 5, 3))
            .await
            .unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.max_streak, 1);
        assert_eq!(stats.games_played, 2);
    }

    #[tokio::test]
    async fn same_day_replay_changes_nothing() {
        let svc = service();
        let first = svc
            .record_completion("u1", 4, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        let replay = svc
            .record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        assert_eq!(replay.games_played, 1);
        assert_eq!(replay.most_recent_score, first.most_recent_score);
        assert_eq!(replay.mistake_distribution.bucket(1), 1);
        assert_eq!(replay.mistake_distribution.bucket(0), 0);
    }

    #[tokio::test]
    async fn validation_rejects_out_of_range_requests() {
        let svc = service();
        let now = noon(2026, 5, 1);
        assert!(svc.record_completion("u1", 6, 5, now).await.is_err());
        assert!(svc.record_completion("u1", 0, 0, now).await.is_err());
        assert!(svc.record_completion("u1", 0, 6, now).await.is_err());
    }

    #[tokio::test]
    async fn reset_zeroes_but_keeps_the_record() {
        let svc = service();
        svc.record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        let reset = svc.reset("u1", noon(2026, 5, 1)).await.unwrap();
        assert_eq!(reset.games_played, 0);
        assert_eq!(reset.current_streak, 0);

        let read_back = svc.get_or_default("u1", noon(2026, 5, 1)).await.unwrap();
        assert_eq!(read_back.games_played, 0);
        // A fresh completion works again after reset, same day included.
        let stats = svc
            .record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        assert_eq!(stats.games_played, 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_record_existed() {
        let svc = service();
        assert!(!svc.delete("u1").await.unwrap());
        svc.record_completion("u1", 5, 5, noon(2026, 5, 1))
            .await
            .unwrap();
        assert!(svc.delete("u1").await.unwrap());
        let stats = svc.get_or_default("u1", noon(2026, 5, 1)).await.unwrap();
        assert_eq!(stats.games_played, 0);
    }
}
