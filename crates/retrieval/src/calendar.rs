//! Civil-calendar context for temporal resolution
//!
//! Replaces ambient wall-clock lookups with an injectable clock so the
//! temporal resolver stays deterministic under test. The calendar exposes
//! the windows the extraction prompt needs: today, tomorrow, the coming
//! weekend, the next seven days, and the current month.

use chrono::{Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of "today" in the configured civil timezone
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation localized to a fixed timezone
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// Fixed clock for tests
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Snapshot of the civil calendar around one reference date
#[derive(Debug, Clone)]
pub struct CivilCalendar {
    today: NaiveDate,
}

impl CivilCalendar {
    pub fn new(clock: &dyn Clock) -> Self {
        Self::for_date(clock.today())
    }

    pub fn for_date(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn tomorrow(&self) -> NaiveDate {
        self.today + Days::new(1)
    }

    /// English weekday name, e.g. "Monday"
    pub fn weekday_name(&self) -> String {
        self.today.format("%A").to_string()
    }

    /// English month name, e.g. "March"
    pub fn month_name(&self) -> String {
        self.today.format("%B").to_string()
    }

    pub fn year(&self) -> i32 {
        self.today.year()
    }

    /// The coming Saturday and Sunday. A Saturday counts as this weekend;
    /// a Sunday points at the next one.
    pub fn weekend_dates(&self) -> [NaiveDate; 2] {
        let weekday = self.today.weekday().num_days_from_monday() as u64;
        let days_until_saturday = (12 - weekday) % 7;
        let saturday = self.today + Days::new(days_until_saturday);
        [saturday, saturday + Days::new(1)]
    }

    /// The seven days starting next Monday. On a Monday the window starts
    /// today.
    pub fn next_week_dates(&self) -> Vec<NaiveDate> {
        let weekday = self.today.weekday().num_days_from_monday() as u64;
        let days_until_monday = (7 - weekday) % 7;
        let monday = self.today + Days::new(days_until_monday);
        (0..7).map(|offset| monday + Days::new(offset)).collect()
    }

    /// Every date of the current civil month
    pub fn month_dates(&self) -> Vec<NaiveDate> {
        let first = self.today.with_day(1).expect("day 1 always exists");
        first
            .iter_days()
            .take_while(|date| date.month() == self.today.month())
            .collect()
    }
}
