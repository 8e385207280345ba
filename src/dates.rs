//! Purchase-date parsing for the guided input flow.

use chrono::NaiveDate;

use crate::error::{BotError, Result};

/// Accepted notations, year-first then day-first.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

/// Parse operator-typed text as a calendar date.
pub fn parse_purchase_date(input: &str) -> Result<NaiveDate> {
    let text = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| BotError::Validation(format!("unrecognised date `{text}`")))
}
