//! Run start-date parsing
//!
//! The service reports `testrun_started` either as a relative phrase ("3 days ago")
//! for recent runs or as an absolute local timestamp ("15.03.2024 02:45 PM") for
//! older ones. [`parse`] turns both into a [`NaiveDateTime`] in local wall-clock
//! time so they can be compared against the configured cutoff.

use crate::error::{Error, Result};
use chrono::{Days, Local, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Format of absolute start dates, e.g. "15.03.2024 02:45 PM"
pub const ABSOLUTE_FORMAT: &str = "%d.%m.%Y %I:%M %p";

/// Source of the current time
///
/// Relative dates are resolved against `now()`; inject a [`FixedClock`] to make
/// them deterministic.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time
    fn now(&self) -> NaiveDateTime;
}

/// The system clock in local time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that always returns the same instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^(\d+) days ago$").unwrap()
    })
}

/// Parse a run start date
///
/// Accepts exactly two shapes:
/// - `"<N> days ago"`, resolved as `clock.now()` minus N calendar days
/// - `"<dd>.<mm>.<yyyy> <hh>:<mm> <AM|PM>"` (see [`ABSOLUTE_FORMAT`])
///
/// Leading and trailing whitespace is ignored.
///
/// # Errors
///
/// Returns [`Error::MalformedDate`] for any other input, including day counts that
/// would move the date out of the representable range.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use evidence_dl::date_filter::{parse, FixedClock};
///
/// let now = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let clock = FixedClock(now);
///
/// let started = parse("1 days ago", &clock).unwrap();
/// assert_eq!(started.to_string(), "2024-02-29 09:00:00");
///
/// let started = parse("15.03.2024 02:45 PM", &clock).unwrap();
/// assert_eq!(started.to_string(), "2024-03-15 14:45:00");
/// ```
pub fn parse(text: &str, clock: &dyn Clock) -> Result<NaiveDateTime> {
    let text = text.trim();

    if let Some(caps) = relative_pattern().captures(text) {
        let days: u64 = caps[1]
            .parse()
            .map_err(|_| Error::MalformedDate(text.to_string()))?;
        return clock
            .now()
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| Error::MalformedDate(text.to_string()));
    }

    NaiveDateTime::parse_from_str(text, ABSOLUTE_FORMAT)
        .map_err(|_| Error::MalformedDate(text.to_string()))
}
