use std::collections::HashSet;

use crate::model::*;

// ── Availability ─────────────────────────────────────────────────

/// Rooms holding at least one active booking that overlaps `stay`.
pub fn booked_room_ids<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    stay: &Stay,
) -> HashSet<RoomId> {
    bookings
        .into_iter()
        .filter(|b| b.is_active() && b.stay.overlaps(stay))
        .map(|b| b.room_id)
        .collect()
}

/// Active rooms minus booked ones, in ascending id order.
pub fn subtract_booked(active_rooms: &[RoomId], booked: &HashSet<RoomId>) -> Vec<RoomId> {
    let mut free: Vec<RoomId> = active_rooms
        .iter()
        .copied()
        .filter(|id| !booked.contains(id))
        .collect();
    free.sort_unstable();
    free.dedup();
    free
}
