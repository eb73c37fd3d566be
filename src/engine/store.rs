use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Monotonic id issuer. Never hands out an id it has already observed.
#[derive(Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn observe(&self, id: u64) {
        self.0.fetch_max(id, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct IdSequences {
    pub room_type: IdSequence,
    pub room: IdSequence,
    pub customer: IdSequence,
    pub booking: IdSequence,
}

impl IdSequences {
    pub fn marks(&self) -> IdMarks {
        IdMarks {
            room_type: self.room_type.current(),
            room: self.room.current(),
            customer: self.customer.current(),
            booking: self.booking.current(),
        }
    }
}

/// Normalised form of a natural key (room number, room-type name, email).
pub fn natural_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// In-memory entity state. Every mutation goes through `apply_*`, both live
/// (after the WAL append) and during replay, so the two paths cannot drift.
#[derive(Default)]
pub struct Store {
    rooms: DashMap<RoomId, SharedRoomState>,
    room_types: DashMap<RoomTypeId, RoomType>,
    customers: DashMap<CustomerId, Customer>,
    booking_to_room: DashMap<BookingId, RoomId>,
    customer_bookings: DashMap<CustomerId, Vec<BookingId>>,
    /// Active rooms only, so a deleted room's number can be reused.
    room_numbers: DashMap<String, RoomId>,
    room_type_names: DashMap<String, RoomTypeId>,
    /// Active customers only.
    customer_emails: DashMap<String, CustomerId>,
    pub ids: IdSequences,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn room(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Room ids in ascending order.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn room_type(&self, id: &RoomTypeId) -> Option<RoomType> {
        self.room_types.get(id).map(|e| e.value().clone())
    }

    pub fn room_types(&self) -> Vec<RoomType> {
        let mut all: Vec<RoomType> = self.room_types.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|t| t.id);
        all
    }

    pub fn customer(&self, id: &CustomerId) -> Option<Customer> {
        self.customers.get(id).map(|e| e.value().clone())
    }

    pub fn customers(&self) -> Vec<Customer> {
        let mut all: Vec<Customer> = self.customers.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn room_for_booking(&self, id: &BookingId) -> Option<RoomId> {
        self.booking_to_room.get(id).map(|e| *e.value())
    }

    pub fn bookings_of_customer(&self, id: &CustomerId) -> Vec<BookingId> {
        self.customer_bookings
            .get(id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn room_id_by_number(&self, number: &str) -> Option<RoomId> {
        self.room_numbers.get(&natural_key(number)).map(|e| *e.value())
    }

    pub fn room_type_id_by_name(&self, name: &str) -> Option<RoomTypeId> {
        self.room_type_names.get(&natural_key(name)).map(|e| *e.value())
    }

    pub fn customer_id_by_email(&self, email: &str) -> Option<CustomerId> {
        self.customer_emails.get(&natural_key(email)).map(|e| *e.value())
    }

    // ── Event application ────────────────────────────────────

    /// Events that touch no existing room: directory records, room creation, id marks.
    pub fn apply_directory(&self, event: &Event) {
        match event {
            Event::IdsReserved(marks) => {
                self.ids.room_type.observe(marks.room_type);
                self.ids.room.observe(marks.room);
                self.ids.customer.observe(marks.customer);
                self.ids.booking.observe(marks.booking);
            }
            Event::RoomTypeCreated(room_type) | Event::RoomTypeUpdated(room_type) => {
                if let Some(old) = self.room_types.get(&room_type.id).map(|e| e.name.clone()) {
                    self.room_type_names
                        .remove_if(&natural_key(&old), |_, id| *id == room_type.id);
                }
                self.room_type_names
                    .insert(natural_key(&room_type.name), room_type.id);
                self.room_types.insert(room_type.id, room_type.clone());
                self.ids.room_type.observe(room_type.id);
            }
            Event::RoomTypeDeleted { id } => {
                if let Some((_, old)) = self.room_types.remove(id) {
                    self.room_type_names
                        .remove_if(&natural_key(&old.name), |_, owner| owner == id);
                }
            }
            Event::RoomCreated(room) => {
                if room.is_active() {
                    self.room_numbers.insert(natural_key(&room.number), room.id);
                }
                self.rooms
                    .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
                self.ids.room.observe(room.id);
            }
            Event::CustomerCreated(customer) | Event::CustomerUpdated(customer) => {
                if let Some(old) = self.customers.get(&customer.id).map(|e| e.email.clone()) {
                    self.customer_emails
                        .remove_if(&natural_key(&old), |_, id| *id == customer.id);
                }
                if customer.is_active() {
                    self.customer_emails
                        .insert(natural_key(&customer.email), customer.id);
                }
                self.customers.insert(customer.id, customer.clone());
                self.ids.customer.observe(customer.id);
            }
            Event::CustomerDeleted { id } => {
                if let Some(mut customer) = self.customers.get_mut(id) {
                    customer.status = CustomerStatus::Deleted;
                    let key = natural_key(&customer.email);
                    drop(customer);
                    self.customer_emails.remove_if(&key, |_, owner| owner == id);
                }
            }
            Event::RoomUpdated(_)
            | Event::RoomDeleted { .. }
            | Event::BookingCreated(_)
            | Event::BookingUpdated { .. }
            | Event::BookingCancelled { .. }
            | Event::BookingCompleted { .. } => {
                debug_assert!(false, "room-scoped event passed to apply_directory");
            }
        }
    }

    /// Events scoped to one room. The caller holds that room's write lock.
    pub fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated(room) => {
                self.room_numbers
                    .remove_if(&natural_key(&rs.room.number), |_, id| *id == room.id);
                if room.is_active() {
                    self.room_numbers.insert(natural_key(&room.number), room.id);
                }
                rs.room = room.clone();
            }
            Event::RoomDeleted { id } => {
                rs.room.status = RoomStatus::Deleted;
                self.room_numbers
                    .remove_if(&natural_key(&rs.room.number), |_, owner| owner == id);
            }
            Event::BookingCreated(booking) => {
                self.index_booking(booking);
                rs.insert_booking(booking.clone());
            }
            Event::BookingUpdated { booking, .. } => {
                if let Some(old) = rs.remove_booking(booking.id) {
                    self.unindex_customer_booking(old.customer_id, old.id);
                }
                self.index_booking(booking);
                rs.insert_booking(booking.clone());
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = BookingStatus::Cancelled;
                }
            }
            Event::BookingCompleted { id, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = BookingStatus::Completed;
                }
            }
            Event::IdsReserved(_)
            | Event::RoomTypeCreated(_)
            | Event::RoomTypeUpdated(_)
            | Event::RoomTypeDeleted { .. }
            | Event::RoomCreated(_)
            | Event::CustomerCreated(_)
            | Event::CustomerUpdated(_)
            | Event::CustomerDeleted { .. } => {
                debug_assert!(false, "directory event passed to apply_to_room");
            }
        }
    }

    /// A booking moving between rooms. The caller holds both write locks.
    pub fn apply_booking_move(&self, from: &mut RoomState, to: &mut RoomState, booking: &Booking) {
        if let Some(old) = from.remove_booking(booking.id) {
            self.unindex_customer_booking(old.customer_id, old.id);
        }
        self.index_booking(booking);
        to.insert_booking(booking.clone());
    }

    fn index_booking(&self, booking: &Booking) {
        self.booking_to_room.insert(booking.id, booking.room_id);
        let mut ids = self.customer_bookings.entry(booking.customer_id).or_default();
        if !ids.contains(&booking.id) {
            ids.push(booking.id);
        }
        drop(ids);
        self.ids.booking.observe(booking.id);
    }

    fn unindex_customer_booking(&self, customer_id: CustomerId, booking_id: BookingId) {
        if let Some(mut ids) = self.customer_bookings.get_mut(&customer_id) {
            ids.retain(|id| *id != booking_id);
        }
    }

    /// Apply one logged event during startup, before the store is shared.
    pub fn replay(&self, event: &Event) {
        match event {
            Event::RoomCreated(_) => self.apply_directory(event),
            Event::BookingUpdated {
                booking,
                previous_room_id,
            } if *previous_room_id != booking.room_id => {
                let (Some(from), Some(to)) = (self.room(previous_room_id), self.room(&booking.room_id))
                else {
                    tracing::warn!("replay: booking {} moves between unknown rooms", booking.id);
                    return;
                };
                let mut from = from.try_write().expect("replay: uncontended write");
                let mut to = to.try_write().expect("replay: uncontended write");
                self.apply_booking_move(&mut from, &mut to, booking);
            }
            other => match other.room_id() {
                Some(room_id) => match self.room(&room_id) {
                    Some(rs) => {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        self.apply_to_room(&mut guard, other);
                    }
                    None => tracing::warn!("replay: event for unknown room {room_id} skipped"),
                },
                None => self.apply_directory(other),
            },
        }
    }
}
