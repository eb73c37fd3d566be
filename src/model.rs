use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type RoomTypeId = u64;
pub type RoomId = u64;
pub type CustomerId = u64;
pub type BookingId = u64;

/// Half-open night range `[start, end)`. The guest checks out on `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Stay {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "Stay start must be before end");
        Self { start, end }
    }

    /// Whole nights between check-in and check-out.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Stay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Amount in minor units (cents). Integer arithmetic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_mul(self, factor: i64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses `"120"`, `"120.5"` or `"120.50"`. At most two decimal places.
impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (units, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if units.is_empty() || !all_digits(units) || !all_digits(fraction) || fraction.len() > 2 {
            return Err(format!("invalid amount {s:?}"));
        }
        let units: i64 = units.parse().map_err(|_| format!("amount {s:?} out of range"))?;
        let cents: i64 = format!("{fraction:0<2}").parse().unwrap_or(0);
        let total = units
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .ok_or_else(|| format!("amount {s:?} out of range"))?;
        Ok(Money(if negative { -total } else { total }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerStatus {
    Active,
    Deleted,
}

/// `Active` is the only status that blocks a room. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            BookingStatus::Active => false,
            BookingStatus::Completed | BookingStatus::Cancelled => true,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Where a booking was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Online,
    Offline,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Online => "online",
            Channel::Offline => "offline",
        })
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Channel::Online),
            "offline" => Ok(Channel::Offline),
            other => Err(format!("unknown channel {other:?}, expected online or offline")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    RoomType,
    Room,
    Customer,
    Booking,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::RoomType => "room type",
            EntityKind::Room => "room",
            EntityKind::Customer => "customer",
            EntityKind::Booking => "booking",
        };
        f.write_str(s)
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub name: String,
    pub description: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub number: String,
    pub description: String,
    pub max_capacity: u8,
    pub nightly_rate: Money,
    pub status: RoomStatus,
    /// Lookup only; the room does not own the type.
    pub room_type_id: RoomTypeId,
}

impl Room {
    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub birthday: NaiveDate,
    pub status: CustomerStatus,
}

impl Customer {
    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub customer_id: CustomerId,
    pub room_id: RoomId,
    pub booked_at: DateTime<Utc>,
    pub stay: Stay,
    /// Always `stay.nights()`.
    pub nights: u32,
    /// Rate at booking time times `nights`.
    pub total_price: Money,
    pub status: BookingStatus,
    pub channel: Channel,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

/// A room and every booking ever made for it, bookings sorted by `stay.start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by stay start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.stay.start <= booking.stay.start);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings of any status whose stay overlaps `query`.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.overlaps(query))
    }

    /// Active bookings overlapping `query`.
    pub fn active_overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.is_active())
    }
}

/// Booking read projection with its references resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub customer: Customer,
    pub room: Room,
}

/// Revenue and counts over a set of bookings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub total_revenue: Money,
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub online: u64,
    pub offline: u64,
}

impl BookingSummary {
    /// Count one booking. `None` when the revenue overflows.
    pub fn tally(&mut self, booking: &Booking) -> Option<()> {
        self.total_revenue = self.total_revenue.checked_add(booking.total_price)?;
        self.total += 1;
        match booking.status {
            BookingStatus::Active => self.active += 1,
            BookingStatus::Completed => self.completed += 1,
            BookingStatus::Cancelled => self.cancelled += 1,
        }
        match booking.channel {
            Channel::Online => self.online += 1,
            Channel::Offline => self.offline += 1,
        }
        Some(())
    }
}

/// Id high-water marks, written at the head of a compacted log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMarks {
    pub room_type: u64,
    pub room: u64,
    pub customer: u64,
    pub booking: u64,
}

/// The WAL record format. Each variant carries the full record after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    IdsReserved(IdMarks),
    RoomTypeCreated(RoomType),
    RoomTypeUpdated(RoomType),
    RoomTypeDeleted {
        id: RoomTypeId,
    },
    RoomCreated(Room),
    RoomUpdated(Room),
    RoomDeleted {
        id: RoomId,
    },
    CustomerCreated(Customer),
    CustomerUpdated(Customer),
    CustomerDeleted {
        id: CustomerId,
    },
    BookingCreated(Booking),
    BookingUpdated {
        booking: Booking,
        previous_room_id: RoomId,
    },
    BookingCancelled {
        id: BookingId,
        room_id: RoomId,
    },
    BookingCompleted {
        id: BookingId,
        room_id: RoomId,
    },
}

impl Event {
    /// The room whose state this event changes, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Event::RoomCreated(room) | Event::RoomUpdated(room) => Some(room.id),
            Event::RoomDeleted { id } => Some(*id),
            Event::BookingCreated(booking) => Some(booking.room_id),
            Event::BookingUpdated { booking, .. } => Some(booking.room_id),
            Event::BookingCancelled { room_id, .. } | Event::BookingCompleted { room_id, .. } => {
                Some(*room_id)
            }
            Event::IdsReserved(_)
            | Event::RoomTypeCreated(_)
            | Event::RoomTypeUpdated(_)
            | Event::RoomTypeDeleted { .. }
            | Event::CustomerCreated(_)
            | Event::CustomerUpdated(_)
            | Event::CustomerDeleted { .. } => None,
        }
    }
}
