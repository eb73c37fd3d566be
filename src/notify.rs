use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, RoomId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed changes: one feed for everything, plus one per room.
pub struct NotifyHub {
    all: broadcast::Sender<Event>,
    rooms: DashMap<RoomId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            rooms: DashMap::new(),
        }
    }

    /// Every committed event, in commit order per room.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Events touching one room: its record and its bookings.
    pub fn subscribe_room(&self, room_id: RoomId) -> broadcast::Receiver<Event> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op for channels nobody listens on. A booking moved between rooms
    /// is announced on both rooms.
    pub fn send(&self, event: &Event) {
        let _ = self.all.send(event.clone());
        if let Some(room_id) = event.room_id() {
            self.send_room(room_id, event);
        }
        if let Event::BookingUpdated {
            booking,
            previous_room_id,
        } = event
            && *previous_room_id != booking.room_id
        {
            self.send_room(*previous_room_id, event);
        }
    }

    fn send_room(&self, room_id: RoomId, event: &Event) {
        if let Some(sender) = self.rooms.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }
}
