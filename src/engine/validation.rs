//! Field validators for directory records. Each returns the value to store
//! (trimmed) or a `Validation` error naming the field.

use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;

use crate::limits::*;
use crate::model::Money;

use super::EngineError;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\s\-\+\(\)]+$").expect("phone pattern compiles"));

pub(crate) fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation(field, "is required"));
    }
    optional_text(field, value, max)
}

pub(crate) fn optional_text(field: &'static str, value: &str, max: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(EngineError::validation(field, format!("must be at most {max} characters")));
    }
    Ok(value.to_string())
}

pub(crate) fn email(value: &str) -> Result<String, EngineError> {
    let value = required_text("email", value, MAX_EMAIL_LEN)?;
    if !EMAIL.is_match(&value) {
        return Err(EngineError::validation("email", "must look like name@domain.tld"));
    }
    Ok(value)
}

/// Phone is optional; an empty value is stored as empty.
pub(crate) fn phone(value: &str) -> Result<String, EngineError> {
    let value = optional_text("phone", value, MAX_PHONE_LEN)?;
    if value.is_empty() {
        return Ok(value);
    }
    if !PHONE.is_match(&value) {
        return Err(EngineError::validation(
            "phone",
            "may contain only digits, spaces, '-', '+', '(' and ')'",
        ));
    }
    if value.chars().count() < MIN_PHONE_LEN {
        return Err(EngineError::validation(
            "phone",
            format!("must be at least {MIN_PHONE_LEN} characters"),
        ));
    }
    Ok(value)
}

pub(crate) fn birthday(value: NaiveDate, today: NaiveDate) -> Result<NaiveDate, EngineError> {
    if value > today {
        return Err(EngineError::validation("birthday", "is in the future"));
    }
    let oldest = today.checked_sub_months(Months::new(MAX_CUSTOMER_AGE_YEARS * 12));
    if oldest.is_some_and(|oldest| value < oldest) {
        return Err(EngineError::validation(
            "birthday",
            format!("is more than {MAX_CUSTOMER_AGE_YEARS} years ago"),
        ));
    }
    Ok(value)
}

pub(crate) fn capacity(value: u8) -> Result<u8, EngineError> {
    if !(MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&value) {
        return Err(EngineError::validation(
            "max_capacity",
            format!("must be between {MIN_ROOM_CAPACITY} and {MAX_ROOM_CAPACITY}"),
        ));
    }
    Ok(value)
}

pub(crate) fn nightly_rate(value: Money) -> Result<Money, EngineError> {
    if value.is_negative() {
        return Err(EngineError::validation("nightly_rate", "must not be negative"));
    }
    Ok(value)
}
