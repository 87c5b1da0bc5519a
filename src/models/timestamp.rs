use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Error as _, Serialize, Serializer};

/// A point in time, independent of any time zone, with nanosecond precision.
///
/// Serialized as an RFC 3339 string in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Non-negative fractions of a second.
    pub nanos: i32,
}

impl Timestamp {
    /// The current time.
    pub fn now() -> Self {
        Utc::now().into()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(time: DateTime<Utc>) -> Self {
        Timestamp {
            seconds: time.timestamp(),
            nanos: time.timestamp_subsec_nanos() as i32,
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let time = DateTime::<Utc>::from_timestamp(self.seconds, self.nanos as u32)
            .ok_or_else(|| S::Error::custom("timestamp out of range"))?;
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}
