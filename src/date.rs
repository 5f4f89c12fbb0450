use crate::error::SdfError;
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::Date;

const MS_PER_DAY: i64 = 24 * 3600 * 1000;

/// Calendar date as entered by the operator. Accepts `YYYY-MM-DD` or
/// `MM/DD/YYYY`, either optionally followed by ` HH:mm` (ignored).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdfDate(pub Date);

impl SdfDate {
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, SdfError> {
        let m = time::Month::try_from(month).map_err(|_| SdfError::InvalidDate(format!("{year}-{month}-{day}")))?;
        Date::from_calendar_date(year, m, day)
            .map(SdfDate)
            .map_err(|_| SdfError::InvalidDate(format!("{year}-{month}-{day}")))
    }

    /// Milliseconds since the Unix epoch at UTC midnight.
    pub fn epoch_ms(self) -> i64 {
        self.0.midnight().assume_utc().unix_timestamp() * 1000
    }

    /// `MM/DD/YYYY`, the IO budget segment format.
    pub fn mdy(self) -> String {
        format!("{:02}/{:02}/{:04}", self.0.month() as u8, self.0.day(), self.0.year())
    }

    /// `MM/DD/YYYY 00:00`, the campaign flight date format.
    pub fn mdy_midnight(self) -> String {
        format!("{} 00:00", self.mdy())
    }
}

/// Whole days between two dates, counted the way the daily budget expects:
/// one hour is added to the end instant before flooring. Under UTC this never
/// changes the result; it is kept so local-time callers see the same spans.
pub fn day_span(start: SdfDate, end: SdfDate) -> i64 {
    let t1 = start.epoch_ms();
    let t2 = end.epoch_ms() + 3_600_000;
    (t2 - t1).div_euclid(MS_PER_DAY)
}

impl fmt::Display for SdfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mdy())
    }
}

impl FromStr for SdfDate {
    type Err = SdfError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let day_part = raw.split_whitespace().next().unwrap_or("");
        let iso = format_description!("[year]-[month]-[day]");
        let us = format_description!("[month padding:none]/[day padding:none]/[year]");
        Date::parse(day_part, iso)
            .or_else(|_| Date::parse(day_part, us))
            .map(SdfDate)
            .map_err(|_| SdfError::InvalidDate(raw.to_string()))
    }
}
