use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::DateKey;

/// The puzzle day rolls over at local midnight US Eastern, DST included.
/// Every date-key computation in the service goes through here; nothing else
/// may derive dates from raw UTC.
pub const REFERENCE_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Date key of the puzzle day containing `instant`.
pub fn date_key_at(instant: DateTime<Utc>) -> DateKey {
    DateKey::new(instant.with_timezone(&REFERENCE_TIMEZONE).date_naive())
}

/// `(today, yesterday)` derived from one instant, so the pair can never
/// straddle a midnight rollover. Yesterday is the calendar predecessor.
pub fn day_pair_at(instant: DateTime<Utc>) -> (DateKey, DateKey) {
    let today = date_key_at(instant);
    (today, today.pred())
}

pub fn today() -> DateKey {
    date_key_at(Utc::now())
}

pub fn yesterday() -> DateKey {
    today().pred()
}
