use crate::infrastructure::error::AgendaError;
use chrono::{Days, NaiveDate, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's date key in the client's wall-clock sense.
pub fn today() -> String {
    Utc::now().date_naive().format(DATE_FORMAT).to_string()
}

/// The calendar day after `date`.
pub fn next_day(date: &str) -> Result<String, AgendaError> {
    shift(date, 1)
}

/// The calendar day before `date`.
pub fn prev_day(date: &str) -> Result<String, AgendaError> {
    shift(date, -1)
}

fn shift(date: &str, offset_days: i64) -> Result<String, AgendaError> {
    let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| AgendaError::InvalidInput(format!("date must be YYYY-MM-DD, got {date}")))?;
    // Only canonical zero-padded keys round-trip as strings.
    if parsed.format(DATE_FORMAT).to_string() != date {
        return Err(AgendaError::InvalidInput(format!(
            "date must be zero-padded YYYY-MM-DD, got {date}"
        )));
    }
    let shifted = if offset_days >= 0 {
        parsed.checked_add_days(Days::new(offset_days as u64))
    } else {
        parsed.checked_sub_days(Days::new(offset_days.unsigned_abs()))
    }
    .ok_or_else(|| AgendaError::InvalidInput(format!("date out of range: {date}")))?;
    Ok(shifted.format(DATE_FORMAT).to_string())
}
