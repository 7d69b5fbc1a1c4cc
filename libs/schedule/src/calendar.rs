//! Calendar windows.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Seven consecutive days, the active scheduling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Week {
    start: NaiveDate,
}

impl Week {
    /// The week beginning on `start`, whatever weekday that is.
    pub fn starting(start: NaiveDate) -> Self {
        Self { start }
    }

    /// The Sunday-start week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let back = u64::from(date.weekday().num_days_from_sunday());
        Self {
            start: date - Days::new(back),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Days::new(6)
    }

    /// The seven dates in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take(7)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }

    /// The date in this week that falls on `weekday`.
    pub fn on(&self, weekday: Weekday) -> NaiveDate {
        let offset = (7 + weekday.num_days_from_sunday() - self.start.weekday().num_days_from_sunday()) % 7;
        self.start + Days::new(u64::from(offset))
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end(),
        }
    }
}

/// An inclusive span of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
