use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::puzzle::PAIRS_PER_PUZZLE;
use super::DateKey;

/// Mistake buckets 0..=5. A fixed array, so malformed input can never mint
/// new histogram keys the way an open map would.
pub const MISTAKE_BUCKETS: usize = PAIRS_PER_PUZZLE + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MistakeDistribution(pub [u32; MISTAKE_BUCKETS]);

impl MistakeDistribution {
    pub fn record(&mut self, mistakes: usize) {
        let bucket = mistakes.min(MISTAKE_BUCKETS - 1);
        self.0[bucket] += 1;
    }

    pub fn bucket(&self, mistakes: usize) -> u32 {
        self.0.get(mistakes).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// Lifetime aggregates for one player, stored in "user_stats" keyed by user
/// id. `version` backs the compare-and-set write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub games_played: u32,
    pub perfect_puzzles: u32,
    /// round(perfect_puzzles / games_played * 100), 0 when no games.
    pub win_percentage: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    pub perfect_streak: u32,
    pub max_perfect_streak: u32,
    pub mistake_distribution: MistakeDistribution,
    /// Mistakes made on the most recent completion.
    pub most_recent_score: Option<u32>,
    pub last_played_date: Option<DateKey>,
    pub version: i64,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn zeroed(user_id: &str, now: DateTime<Utc>) -> Self {
        UserStats {
            user_id: user_id.to_string(),
            games_played: 0,
            perfect_puzzles: 0,
            win_percentage: 0,
            current_streak: 0,
            max_streak: 0,
            perfect_streak: 0,
            max_perfect_streak: 0,
            mistake_distribution: MistakeDistribution::default(),
            most_recent_score: None,
            last_played_date: None,
            version: 0,
            updated_at: now,
        }
    }

    /// Fold one completed puzzle into the record. Pure: the caller supplies
    /// the date pair and persists the result.
    ///
    /// Recording is idempotent per day: a second completion on the same date
    /// key returns the record unchanged. A missed calendar day (last play
    /// neither today nor yesterday) restarts both streaks at this game
    /// instead of extending them; max values are never lowered.
    pub fn apply_completion(
        &self,
        today: DateKey,
        yesterday: DateKey,
        correct_answers: u32,
        total_questions: u32,
        now: DateTime<Utc>,
    ) -> UserStats {
        if self.last_played_date == Some(today) {
            return self.clone();
        }
        let mistakes = total_questions
            .saturating_sub(correct_answers)
            .min(PAIRS_PER_PUZZLE as u32) as usize;
        let is_perfect = mistakes == 0;

        let mut next = self.clone();
        if self.last_played_date == Some(yesterday) {
            next.current_streak += 1;
            next.perfect_streak = if is_perfect {
                next.perfect_streak + 1
            } else {
                0
            };
        } else {
            next.current_streak = 1;
            next.perfect_streak = u32::from(is_perfect);
        }
        next.games_played += 1;
        if is_perfect {
            next.perfect_puzzles += 1;
        }
        next.mistake_distribution.record(mistakes);
        next.most_recent_score = Some(mistakes as u32);
        next.last_played_date = Some(today);
        next.win_percentage = percentage(next.perfect_puzzles, next.games_played);
        next.max_streak = next.max_streak.max(next.current_streak);
        next.max_perfect_streak = next.max_perfect_streak.max(next.perfect_streak);
        next.updated_at = now;
        next
    }
}

fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        0
    } else {
        ((part as f64 / whole as f64) * 100.0).round() as u32
    }
}

/// Body of `PUT /stats/{userId}`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordCompletionRequest {
    pub correct_answers: u32,
    #[validate(range(min = 1, max = 5, message = "totalQuestions must be between 1 and 5"))]
    pub total_questions: u32,
}

/// Stats as served to the client (storage bookkeeping stripped).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub user_id: String,
    pub games_played: u32,
    pub perfect_puzzles: u32,
    pub win_percentage: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    pub perfect_streak: u32,
    pub max_perfect_streak: u32,
    pub mistake_distribution: MistakeDistribution,
    pub most_recent_score: Option<u32>,
    pub last_played_date: Option<DateKey>,
}

impl From<UserStats> for StatsView {
    fn from(stats: UserStats) -> Self {
        StatsView {
            user_id: stats.user_id,
            games_played: stats.games_played,
            perfect_puzzles: stats.perfect_puzzles,
            win_percentage: stats.win_percentage,
            current_streak: stats.current_streak,
            max_streak: stats.max_streak,
            perfect_streak: stats.perfect_streak,
            max_perfect_streak: stats.max_perfect_streak,
            mistake_distribution: stats.mistake_distribution,
            most_recent_score: stats.most_recent_score,
            last_played_date: stats.last_played_date,
        }
    }
}
