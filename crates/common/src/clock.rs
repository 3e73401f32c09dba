//! Source of "today" for date-dependent business rules.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Days, Local, NaiveDate, Utc};

/// Provides the current date and instant.
///
/// Services never read the system clock directly so that due-date checks,
/// aging and generated document numbers can be pinned in tests.
pub trait Clock: Send + Sync {
    /// The current calendar date.
    fn today(&self) -> NaiveDate;

    /// The current instant, used for record timestamps.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a settable date.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    /// Creates a clock fixed at `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Moves the clock to another date.
    pub fn set(&self, date: NaiveDate) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    /// Moves the clock forward by `days`.
    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = today.checked_add_days(Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.today()
            .and_hms_opt(9, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fixed_clock_returns_configured_date() {
        let clock = FixedClock::new(date(2025, 3, 1));
        assert_eq!(clock.today(), date(2025, 3, 1));
        assert_eq!(clock.now().date_naive(), date(2025, 3, 1));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(date(2025, 1, 30));
        clock.advance_days(3);
        assert_eq!(clock.today(), date(2025, 2, 2));

        clock.set(date(2024, 12, 31));
        assert_eq!(clock.today(), date(2024, 12, 31));
    }
}
