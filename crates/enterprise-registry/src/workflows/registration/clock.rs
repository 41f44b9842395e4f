use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};

/// Source of "now" for the workflow, expressed in the registry's reference time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn offset(&self) -> FixedOffset;

    /// Civil date in the reference time zone.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset()).date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Falls back to UTC when the offset is outside what `FixedOffset` accepts.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset =
            FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::with_offset_minutes(0)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Whole years elapsed between `birth_date` and `today` on the proleptic Gregorian calendar.
/// Someone born on 29 February turns a year older on 1 March in non-leap years.
pub fn age_in_years(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years
}
