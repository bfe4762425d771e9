//! Wall-clock helpers. Missions store naive local date/time in the user's
//! configured IANA zone; these convert at the edges.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

pub fn parse_timezone(tz: &str) -> Result<Tz, ValidationError> {
    tz.trim().parse().map_err(|_| ValidationError::invalid("timezone", tz))
}

/// Current local wall time in `tz`, seconds kept.
pub fn local_now(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

/// Local wall time to UTC. `None` for times skipped by a DST jump; the
/// earlier instant wins when the clock falls back.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
