// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Timestamps written into profile documents and queue entries.

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 in UTC with millisecond precision, so writes within the same
/// second still order correctly as strings.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Time elapsed since a stored timestamp; `None` if it does not parse.
pub fn age(stamp: &str) -> Option<chrono::Duration> {
    let then = DateTime::parse_from_rfc3339(stamp).ok()?;
    Some(Utc::now().signed_duration_since(then.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millisecond_z_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(timestamp(at), "2026-03-01T08:30:00.000Z");
    }

    #[test]
    fn age_of_garbage_is_none() {
        assert!(age("yesterday").is_none());
        let age = age(&timestamp(Utc::now() - chrono::Duration::minutes(5))).unwrap();
        assert!(age >= chrono::Duration::minutes(5));
    }
}
