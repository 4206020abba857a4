use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod puzzle;
pub mod session;
pub mod stats;
pub mod user;

/// Canonical calendar date key (`YYYY-MM-DD`) in the puzzle reference timezone.
///
/// Serializes as the plain string in both JSON and BSON, so puzzle documents
/// keyed by date stay range-scannable with `$gte`/`$lte` on `_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        DateKey(date)
    }

    pub fn as_date(&self) -> NaiveDate {
        self.0
    }

    /// Calendar predecessor: the previous date, not "now minus 24 hours".
    pub fn pred(self) -> DateKey {
        DateKey(self.0.pred_opt().unwrap_or(self.0))
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(DateKey)
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for DateKey {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        Ok(DateTime::from_timestamp_millis(bson_dt.timestamp_millis()).unwrap())
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let bson_dt = bson::DateTime::from_millis(d.timestamp_millis());
                serializer.serialize_some(&bson_dt)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt_bson_dt
            .map(|bson_dt| DateTime::from_timestamp_millis(bson_dt.timestamp_millis()).unwrap()))
    }
}
