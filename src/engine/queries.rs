use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::availability::{booked_room_ids, subtract_booked};
use super::conflict::today;
use super::{Engine, EngineError, observe};

/// Optional narrowing of an availability query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityFilter {
    pub room_type_id: Option<RoomTypeId>,
    pub min_capacity: Option<u8>,
}

impl AvailabilityFilter {
    fn admits(&self, room: &Room) -> bool {
        self.room_type_id.is_none_or(|t| room.room_type_id == t)
            && self.min_capacity.is_none_or(|c| room.max_capacity >= c)
    }
}

/// Case-insensitive substring match over any field. A blank query matches everything.
fn matches_query(query: &str, fields: &[&str]) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(&query))
}

fn sort_bookings(bookings: &mut [BookingDetails]) {
    bookings.sort_by_key(|d| (d.booking.stay.start, d.booking.id));
}

impl Engine {
    // ── Availability ─────────────────────────────────────────

    /// Active rooms with no active booking overlapping `[start, end)`, ordered by id.
    pub async fn available_rooms(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: AvailabilityFilter,
    ) -> Result<Vec<Room>, EngineError> {
        observe("available_rooms", async {
            if start >= end {
                return Err(EngineError::validation("end", "check-out must be after check-in"));
            }
            if start < today() {
                return Err(EngineError::validation("start", format!("check-in {start} is in the past")));
            }
            let query = Stay::new(start, end);

            let mut active = Vec::new();
            let mut rooms = HashMap::new();
            let mut overlapping = Vec::new();
            for room_id in self.store.room_ids() {
                let rs = self.room_state(room_id)?;
                let guard = self.read_room(&rs).await?;
                if !guard.room.is_active() || !filter.admits(&guard.room) {
                    continue;
                }
                active.push(room_id);
                rooms.insert(room_id, guard.room.clone());
                overlapping.extend(guard.active_overlapping(&query).cloned());
            }

            let booked = booked_room_ids(&overlapping, &query);
            Ok(subtract_booked(&active, &booked)
                .into_iter()
                .filter_map(|id| rooms.remove(&id))
                .collect())
        }
        .await)
    }

    // ── Booking reads ────────────────────────────────────────

    fn details(&self, booking: Booking, room: &Room) -> Result<BookingDetails, EngineError> {
        let customer = self
            .store
            .customer(&booking.customer_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Customer, booking.customer_id))?;
        Ok(BookingDetails {
            booking,
            customer,
            room: room.clone(),
        })
    }

    /// Every booking on every room passing `keep`, resolved and ordered by stay start.
    async fn collect_bookings(
        &self,
        keep: impl Fn(&Booking) -> bool,
    ) -> Result<Vec<BookingDetails>, EngineError> {
        let mut out = Vec::new();
        for room_id in self.store.room_ids() {
            let rs = self.room_state(room_id)?;
            let guard = self.read_room(&rs).await?;
            for booking in guard.bookings.iter().filter(|&b| keep(b)) {
                out.push(self.details(booking.clone(), &guard.room)?);
            }
        }
        sort_bookings(&mut out);
        Ok(out)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<BookingDetails, EngineError> {
        let not_found = || EngineError::not_found(EntityKind::Booking, id);
        let room_id = self.store.room_for_booking(&id).ok_or_else(not_found)?;
        let rs = self.room_state(room_id)?;
        let guard = self.read_room(&rs).await?;
        let booking = guard.booking(id).cloned().ok_or_else(not_found)?;
        self.details(booking, &guard.room)
    }

    /// All bookings of every status.
    pub async fn list_bookings(&self) -> Result<Vec<BookingDetails>, EngineError> {
        self.collect_bookings(|_| true).await
    }

    /// A deleted customer still returns its history.
    pub async fn bookings_by_customer(&self, customer_id: CustomerId) -> Result<Vec<BookingDetails>, EngineError> {
        if self.store.customer(&customer_id).is_none() {
            return Err(EngineError::not_found(EntityKind::Customer, customer_id));
        }
        let mut out = Vec::new();
        for id in self.store.bookings_of_customer(&customer_id) {
            match self.get_booking(id).await {
                // Moved to another customer since the index was read.
                Ok(details) if details.booking.customer_id != customer_id => {}
                Ok(details) => out.push(details),
                Err(e) => return Err(e),
            }
        }
        sort_bookings(&mut out);
        Ok(out)
    }

    pub async fn bookings_by_room(&self, room_id: RoomId) -> Result<Vec<BookingDetails>, EngineError> {
        let rs = self.room_state(room_id)?;
        let guard = self.read_room(&rs).await?;
        guard
            .bookings
            .iter()
            .map(|b| self.details(b.clone(), &guard.room))
            .collect()
    }

    /// Bookings of any status whose stay overlaps `[from, to)`.
    pub async fn bookings_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookingDetails>, EngineError> {
        if from >= to {
            return Err(EngineError::validation("to", "range end must be after its start"));
        }
        let query = Stay::new(from, to);
        self.collect_bookings(|b| b.stay.overlaps(&query)).await
    }

    pub async fn bookings_by_channel(&self, channel: Channel) -> Result<Vec<BookingDetails>, EngineError> {
        self.collect_bookings(|b| b.channel == channel).await
    }

    /// Bookings made (not stayed) between `from` and `to`, both days inclusive, in UTC.
    pub async fn bookings_booked_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookingDetails>, EngineError> {
        if from > to {
            return Err(EngineError::validation("to", "range end must not precede its start"));
        }
        self.collect_bookings(|b| {
            let day = b.booked_at.date_naive();
            from <= day && day <= to
        })
        .await
    }

    /// Revenue and status/channel counts over the bookings `bookings_booked_between`
    /// returns. Revenue includes cancelled bookings.
    pub async fn booking_summary(&self, from: NaiveDate, to: NaiveDate) -> Result<BookingSummary, EngineError> {
        let mut summary = BookingSummary::default();
        for details in self.bookings_booked_between(from, to).await? {
            summary
                .tally(&details.booking)
                .ok_or_else(|| EngineError::validation("total_revenue", "revenue overflows"))?;
        }
        Ok(summary)
    }

    // ── Room types ───────────────────────────────────────────

    pub fn get_room_type(&self, id: RoomTypeId) -> Result<RoomType, EngineError> {
        self.store
            .room_type(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::RoomType, id))
    }

    pub fn list_room_types(&self) -> Vec<RoomType> {
        self.store.room_types()
    }

    pub fn search_room_types(&self, query: &str) -> Vec<RoomType> {
        self.store
            .room_types()
            .into_iter()
            .filter(|t| matches_query(query, &[t.name.as_str(), t.description.as_str(), t.note.as_str()]))
            .collect()
    }

    // ── Rooms ────────────────────────────────────────────────

    /// Any status.
    pub async fn get_room(&self, id: RoomId) -> Result<Room, EngineError> {
        let rs = self.room_state(id)?;
        let guard = self.read_room(&rs).await?;
        Ok(guard.room.clone())
    }

    async fn active_rooms_where(&self, keep: impl Fn(&Room) -> bool) -> Result<Vec<Room>, EngineError> {
        let mut out = Vec::new();
        for room_id in self.store.room_ids() {
            let rs = self.room_state(room_id)?;
            let guard = self.read_room(&rs).await?;
            if guard.room.is_active() && keep(&guard.room) {
                out.push(guard.room.clone());
            }
        }
        Ok(out)
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, EngineError> {
        self.active_rooms_where(|_| true).await
    }

    pub async fn rooms_by_type(&self, room_type_id: RoomTypeId) -> Result<Vec<Room>, EngineError> {
        self.get_room_type(room_type_id)?;
        self.active_rooms_where(|r| r.room_type_id == room_type_id).await
    }

    /// Matches room number or description.
    pub async fn search_rooms(&self, query: &str) -> Result<Vec<Room>, EngineError> {
        self.active_rooms_where(|r| matches_query(query, &[r.number.as_str(), r.description.as_str()]))
            .await
    }

    // ── Customers ────────────────────────────────────────────

    /// Any status.
    pub fn get_customer(&self, id: CustomerId) -> Result<Customer, EngineError> {
        self.store
            .customer(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Customer, id))
    }

    /// Active customers only; emails compare case-insensitively.
    pub fn customer_by_email(&self, email: &str) -> Option<Customer> {
        self.store
            .customer_id_by_email(email)
            .and_then(|id| self.store.customer(&id))
    }

    pub fn list_customers(&self) -> Vec<Customer> {
        self.store
            .customers()
            .into_iter()
            .filter(Customer::is_active)
            .collect()
    }

    /// Matches full name, email or phone.
    pub fn search_customers(&self, query: &str) -> Vec<Customer> {
        self.store
            .customers()
            .into_iter()
            .filter(|c| c.is_active() && matches_query(query, &[c.full_name.as_str(), c.email.as_str(), c.phone.as_str()]))
            .collect()
    }
}
