use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::firestore::error::{invalid_argument, FirestoreResult};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Point in time with nanosecond precision, as carried by `timestampValue`,
/// `readTime`, `updateTime` and `commitTime`.
///
/// `nanos` is always in `0..1_000_000_000`; ordering is chronological.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    seconds: i64,
    nanos: i32,
}

impl Timestamp {
    /// Builds a timestamp, carrying out-of-range `nanos` into `seconds`.
    pub fn new(seconds: i64, nanos: i32) -> Self {
        let total_nanos = i64::from(nanos);
        Self {
            seconds: seconds + total_nanos.div_euclid(NANOS_PER_SECOND),
            nanos: total_nanos.rem_euclid(NANOS_PER_SECOND) as i32,
        }
    }

    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    /// Parses the RFC 3339 form used on the wire.
    pub fn parse_rfc3339(value: &str) -> FirestoreResult<Self> {
        let datetime = DateTime::parse_from_rfc3339(value)
            .map_err(|err| invalid_argument(format!("Invalid timestamp '{value}': {err}")))?;
        Ok(Self::from(datetime.with_timezone(&Utc)))
    }

    pub fn to_rfc3339(&self) -> FirestoreResult<String> {
        self.to_datetime()
            .map(|datetime| datetime.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .ok_or_else(|| invalid_argument(format!("Timestamp out of range: {}s", self.seconds)))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos as u32).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::new(value.timestamp(), value.timestamp_subsec_nanos() as i32)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        Self::from(DateTime::<Utc>::from(value))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "Timestamp(seconds={}, nanos={})", self.seconds, self.nanos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn carries_nanoseconds() {
        let timestamp = Timestamp::new(1, 1_500_000_000);
        assert_eq!((timestamp.seconds(), timestamp.nanos()), (2, 500_000_000));

        let negative = Timestamp::new(0, -1);
        assert_eq!((negative.seconds(), negative.nanos()), (-1, 999_999_999));
    }

    #[test]
    fn rfc3339_wire_format() {
        let parsed = Timestamp::parse_rfc3339("2024-03-01T12:00:00.250+01:00").unwrap();
        assert_eq!(parsed.nanos(), 250_000_000);
        assert_eq!(parsed.to_rfc3339().unwrap(), "2024-03-01T11:00:00.250000000Z");
        let err = Timestamp::parse_rfc3339("yesterday").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn orders_by_seconds_then_nanos() {
        assert!(Timestamp::new(1, 900) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 1) > Timestamp::new(2, 0));
    }

    #[test]
    fn converts_system_time() {
        let time = UNIX_EPOCH + Duration::new(1_714_557_600, 5);
        assert_eq!(Timestamp::from(time), Timestamp::new(1_714_557_600, 5));
    }
}
