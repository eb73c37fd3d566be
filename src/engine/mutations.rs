use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info, warn};

use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, today, validate_stay};
use super::{Engine, EngineError, observe};

/// A booking's mutable inputs. Nights, price, status and `booked_at` are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_id: CustomerId,
    pub room_id: RoomId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub channel: Channel,
}

/// A booking's room can move under us between the index lookup and the lock.
const RESOLVE_ATTEMPTS: usize = 3;

fn total_price(rate: Money, nights: i64) -> Result<Money, EngineError> {
    rate.checked_mul(nights)
        .ok_or_else(|| EngineError::validation("total_price", "rate times nights overflows"))
}

fn conflict_checked(rs: &RoomState, stay: &Stay, exclude: Option<BookingId>) -> Result<(), EngineError> {
    check_no_conflict(rs, stay, exclude).inspect_err(|_| {
        metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
    })
}

/// The booking as `req` would leave it, checked against the target room.
fn revise(existing: &Booking, req: &BookingRequest, stay: Stay, target: &RoomState) -> Result<Booking, EngineError> {
    if !existing.is_active() {
        return Err(EngineError::InvalidTransition {
            id: existing.id,
            status: existing.status,
        });
    }
    if !target.room.is_active() {
        return Err(EngineError::not_found(EntityKind::Room, target.room.id));
    }
    conflict_checked(target, &stay, Some(existing.id))?;
    let nights = stay.nights();
    Ok(Booking {
        customer_id: req.customer_id,
        room_id: target.room.id,
        stay,
        nights: nights as u32,
        total_price: total_price(target.room.nightly_rate, nights)?,
        channel: req.channel,
        ..existing.clone()
    })
}

impl Engine {
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        observe("create_booking", async {
            let stay = validate_stay(req.start, req.end, today())?;
            let _permit = self.write_permit().await?;
            let _dir = self.directory_shared().await?;
            self.active_customer(req.customer_id)?;
            let mut guard = self.write_room(req.room_id).await?;
            if !guard.room.is_active() {
                return Err(EngineError::not_found(EntityKind::Room, req.room_id));
            }
            conflict_checked(&guard, &stay, None)?;

            let nights = stay.nights();
            let booking = Booking {
                id: self.store.ids.booking.next(),
                customer_id: req.customer_id,
                room_id: req.room_id,
                booked_at: Utc::now(),
                stay,
                nights: nights as u32,
                total_price: total_price(guard.room.nightly_rate, nights)?,
                status: BookingStatus::Active,
                channel: req.channel,
            };
            self.persist_room(&mut guard, &Event::BookingCreated(booking.clone()))
                .await?;
            info!(
                "booking {} created: room {} {} for customer {}",
                booking.id, booking.room_id, booking.stay, booking.customer_id
            );
            Ok(booking)
        }
        .await)
    }

    /// Change an active booking's customer, room, dates or channel. The price is
    /// recomputed at the target room's current rate; `booked_at` is kept.
    pub async fn update_booking(&self, id: BookingId, req: BookingRequest) -> Result<Booking, EngineError> {
        observe("update_booking", async {
            let stay = validate_stay(req.start, req.end, today())?;
            let _permit = self.write_permit().await?;
            let _dir = self.directory_shared().await?;
            self.active_customer(req.customer_id)?;

            for _ in 0..RESOLVE_ATTEMPTS {
                let current = self.booking_room(id)?;
                if current == req.room_id {
                    let mut guard = self.write_room(current).await?;
                    let Some(existing) = guard.booking(id).cloned() else {
                        continue;
                    };
                    let booking = revise(&existing, &req, stay, &guard)?;
                    let event = Event::BookingUpdated {
                        booking: booking.clone(),
                        previous_room_id: current,
                    };
                    self.persist_room(&mut guard, &event).await?;
                    info!("booking {id} updated: room {} {}", booking.room_id, booking.stay);
                    return Ok(booking);
                }

                let (mut from, mut to) = self.write_room_pair(current, req.room_id).await?;
                let Some(existing) = from.booking(id).cloned() else {
                    continue;
                };
                let booking = revise(&existing, &req, stay, &to)?;
                let event = Event::BookingUpdated {
                    booking: booking.clone(),
                    previous_room_id: current,
                };
                self.persist_move(&mut from, &mut to, &event).await?;
                info!("booking {id} moved: room {current} -> {} {}", booking.room_id, booking.stay);
                return Ok(booking);
            }
            Err(EngineError::Timeout("booking room resolution"))
        }
        .await)
    }

    /// Cancelling an already cancelled booking is a no-op returning it unchanged.
    pub async fn cancel_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        observe("cancel_booking", async {
            let _permit = self.write_permit().await?;
            let (mut guard, mut booking) = self.resolve_booking_write(id).await?;
            match booking.status {
                BookingStatus::Cancelled => {
                    debug!("booking {id} already cancelled");
                    Ok(booking)
                }
                BookingStatus::Completed => Err(EngineError::InvalidTransition {
                    id,
                    status: booking.status,
                }),
                BookingStatus::Active => {
                    let event = Event::BookingCancelled {
                        id,
                        room_id: booking.room_id,
                    };
                    self.persist_room(&mut guard, &event).await?;
                    booking.status = BookingStatus::Cancelled;
                    info!("booking {id} cancelled");
                    Ok(booking)
                }
            }
        }
        .await)
    }

    pub async fn complete_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        observe("complete_booking", async {
            let _permit = self.write_permit().await?;
            let (mut guard, mut booking) = self.resolve_booking_write(id).await?;
            if booking.status.is_terminal() {
                return Err(EngineError::InvalidTransition {
                    id,
                    status: booking.status,
                });
            }
            let event = Event::BookingCompleted {
                id,
                room_id: booking.room_id,
            };
            self.persist_room(&mut guard, &event).await?;
            booking.status = BookingStatus::Completed;
            info!("booking {id} completed");
            Ok(booking)
        }
        .await)
    }

    /// Complete every active booking checked out on or before `today`, room by room.
    /// Bookings cancelled while the sweep runs are skipped. A failure stops the
    /// sweep; what it already completed stays completed and is logged.
    pub async fn complete_elapsed_bookings(&self, today: NaiveDate) -> Result<Vec<BookingId>, EngineError> {
        let mut completed = Vec::new();
        let result = self.complete_due_by_room(today, &mut completed).await;
        metrics::counter!(observability::BOOKINGS_COMPLETED_TOTAL).increment(completed.len() as u64);
        match result {
            Ok(()) => Ok(completed),
            Err(e) => {
                warn!(
                    "elapsed sweep stopped after completing {} bookings {completed:?}: {e}",
                    completed.len()
                );
                Err(e)
            }
        }
    }

    async fn complete_due_by_room(&self, today: NaiveDate, completed: &mut Vec<BookingId>) -> Result<(), EngineError> {
        for room_id in self.store.room_ids() {
            let rs = self.room_state(room_id)?;
            let due: Vec<BookingId> = {
                let guard = self.read_room(&rs).await?;
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.is_active() && b.stay.end <= today)
                    .map(|b| b.id)
                    .collect()
            };
            for id in due {
                match self.complete_booking(id).await {
                    Ok(_) => completed.push(id),
                    Err(EngineError::InvalidTransition { status, .. }) => {
                        debug!("elapsed sweep skip {id}: now {status}");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    // ── Lock helpers ─────────────────────────────────────────

    fn booking_room(&self, id: BookingId) -> Result<RoomId, EngineError> {
        self.store
            .room_for_booking(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Booking, id))
    }

    /// Lookup booking → room, acquire the room's write lock, return the booking.
    async fn resolve_booking_write(
        &self,
        id: BookingId,
    ) -> Result<(OwnedRwLockWriteGuard<RoomState>, Booking), EngineError> {
        for _ in 0..RESOLVE_ATTEMPTS {
            let guard = self.write_room(self.booking_room(id)?).await?;
            if let Some(booking) = guard.booking(id).cloned() {
                return Ok((guard, booking));
            }
        }
        Err(EngineError::Timeout("booking room resolution"))
    }

    /// Write-lock two distinct rooms in ascending id order to prevent deadlocks.
    async fn write_room_pair(
        &self,
        a: RoomId,
        b: RoomId,
    ) -> Result<(OwnedRwLockWriteGuard<RoomState>, OwnedRwLockWriteGuard<RoomState>), EngineError> {
        if a < b {
            let ga = self.write_room(a).await?;
            let gb = self.write_room(b).await?;
            Ok((ga, gb))
        } else {
            let gb = self.write_room(b).await?;
            let ga = self.write_room(a).await?;
            Ok((ga, gb))
        }
    }
}
