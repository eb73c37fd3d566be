use chrono::{Local, NaiveDate};

use crate::limits::{MAX_STAY_NIGHTS, MIN_STAY_NIGHTS};
use crate::model::*;

use super::EngineError;

/// Today's date on the local clock. Stays may not start before it.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn validate_stay(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Result<Stay, EngineError> {
    if start >= end {
        return Err(EngineError::validation("end", "check-out must be after check-in"));
    }
    if start < today {
        return Err(EngineError::validation("start", format!("check-in {start} is in the past")));
    }
    let nights = (end - start).num_days();
    if !(MIN_STAY_NIGHTS..=MAX_STAY_NIGHTS).contains(&nights) {
        return Err(EngineError::validation(
            "end",
            format!("stay must be {MIN_STAY_NIGHTS} to {MAX_STAY_NIGHTS} nights, got {nights}"),
        ));
    }
    Ok(Stay::new(start, end))
}

/// First active booking on the room overlapping `stay`, ignoring `exclude`.
fn first_conflict<'a>(rs: &'a RoomState, stay: &Stay, exclude: Option<BookingId>) -> Option<&'a Booking> {
    rs.active_overlapping(stay)
        .find(|b| Some(b.id) != exclude)
}

pub fn has_conflict(rs: &RoomState, stay: &Stay, exclude: Option<BookingId>) -> bool {
    first_conflict(rs, stay, exclude).is_some()
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    stay: &Stay,
    exclude: Option<BookingId>,
) -> Result<(), EngineError> {
    match first_conflict(rs, stay, exclude) {
        Some(existing) => Err(EngineError::Conflict {
            booking_id: existing.id,
            stay: existing.stay,
        }),
        None => Ok(()),
    }
}
