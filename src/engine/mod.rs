mod availability;
mod conflict;
mod directory;
mod error;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;
mod validation;

pub use availability::{booked_room_ids, subtract_booked};
pub use conflict::{has_conflict, today};
pub use directory::{CustomerInput, RoomInput, RoomTypeInput};
pub use error::EngineError;
pub use mutations::BookingRequest;
pub use queries::AvailabilityFilter;
pub use store::{SharedRoomState, Store, natural_key};

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tokio::sync::{
    OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, mpsc,
    oneshot,
};
use tracing::{error, warn};

use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

/// All or nothing: a failure anywhere in the batch rolls the log back to where
/// the batch started, so no caller told `Err` finds its event after a restart.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        warn!("WAL batch of {} failed, rolling back: {e}", batch.len());
        if let Err(rollback_err) = wal.rollback() {
            error!("WAL rollback failed: {rollback_err}");
        }
    }
    result
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The reservation core. Built once per data directory and shared as `Arc<Engine>`.
///
/// Lock order: `write_gate` (shared) → `directory_lock` → room locks in ascending id.
pub struct Engine {
    pub(super) store: Store,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Exclusive for directory writes and the natural-key checks they make,
    /// shared by booking writes while they rely on a customer being active.
    directory_lock: RwLock<()>,
    /// Held shared by every write and exclusively by compaction.
    write_gate: RwLock<()>,
    lock_timeout: Duration,
    /// OS lock on `<wal>.lock`; released when the engine drops.
    _owner: File,
}

/// Take the exclusive owner lock for a WAL, failing fast if another engine holds it.
fn lock_owner(wal_path: &Path) -> io::Result<File> {
    let lock_path = wal_path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    file.try_lock_exclusive().map_err(|e| {
        io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("{} is in use by another process: {e}", lock_path.display()),
        )
    })?;
    Ok(file)
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let owner = lock_owner(&wal_path)?;
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Sole owner of every Arc here, so replay's try_write never contends.
        let store = Store::new();
        for event in &events {
            store.replay(event);
        }
        tracing::debug!("replayed {} events from {}", events.len(), wal_path.display());

        Ok(Self {
            store,
            wal_tx,
            notify,
            directory_lock: RwLock::new(()),
            write_gate: RwLock::new(()),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            _owner: owner,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    // ── Locking ──────────────────────────────────────────────

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, EngineError> {
        tokio::time::timeout(self.lock_timeout, fut)
            .await
            .map_err(|_| EngineError::Timeout(what))
    }

    /// Shared write permit. Blocks only while a compaction snapshot is taken.
    pub(super) async fn write_permit(&self) -> Result<RwLockReadGuard<'_, ()>, EngineError> {
        self.bounded("write gate", self.write_gate.read()).await
    }

    pub(super) async fn directory_guard(&self) -> Result<RwLockWriteGuard<'_, ()>, EngineError> {
        self.bounded("directory lock", self.directory_lock.write()).await
    }

    /// Keeps directory writes out while a booking write depends on its customer.
    pub(super) async fn directory_shared(&self) -> Result<RwLockReadGuard<'_, ()>, EngineError> {
        self.bounded("directory lock", self.directory_lock.read()).await
    }

    pub(super) fn room_state(&self, room_id: RoomId) -> Result<SharedRoomState, EngineError> {
        self.store
            .room(&room_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Room, room_id))
    }

    pub(super) async fn write_room(
        &self,
        room_id: RoomId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self.room_state(room_id)?;
        self.bounded("room lock", rs.write_owned()).await
    }

    /// Room read lock, retrying a timed-out wait with exponential backoff.
    pub(super) async fn read_room(
        &self,
        rs: &SharedRoomState,
    ) -> Result<OwnedRwLockReadGuard<RoomState>, EngineError> {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.lock_timeout, rs.clone().read_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) if attempt < READ_RETRY_ATTEMPTS => {
                    let delay = Duration::from_millis(READ_RETRY_BASE_DELAY_MS << attempt);
                    attempt += 1;
                    metrics::counter!(observability::READ_RETRIES_TOTAL).increment(1);
                    warn!("room read lock timed out, retry {attempt} in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(_) => return Err(EngineError::Timeout("room read lock")),
            }
        }
    }

    // ── Persist + apply ──────────────────────────────────────

    /// WAL-append, apply to the locked room, notify.
    pub(super) async fn persist_room(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_room(rs, event);
        self.notify.send(event);
        Ok(())
    }

    /// WAL-append, apply a booking move between two locked rooms, notify.
    pub(super) async fn persist_move(
        &self,
        from: &mut RoomState,
        to: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        if let Event::BookingUpdated { booking, .. } = event {
            self.store.apply_booking_move(from, to, booking);
        }
        self.notify.send(event);
        Ok(())
    }

    /// WAL-append, apply a directory event, notify. Caller holds the directory lock.
    pub(super) async fn persist_directory(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_directory(event);
        self.notify.send(event);
        Ok(())
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.bounded("write gate", self.write_gate.write()).await?;

        let mut events = vec![Event::IdsReserved(self.store.ids.marks())];
        events.extend(self.store.room_types().into_iter().map(Event::RoomTypeCreated));
        events.extend(self.store.customers().into_iter().map(Event::CustomerCreated));

        let mut bookings = Vec::new();
        for room_id in self.store.room_ids() {
            let rs = self.room_state(room_id)?;
            let guard = self.read_room(&rs).await?;
            events.push(Event::RoomCreated(guard.room.clone()));
            bookings.extend(guard.bookings.iter().cloned().map(Event::BookingCreated));
        }
        events.extend(bookings);

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Count an operation's outcome and pass the result through.
pub(super) fn observe<T>(op: &'static str, result: Result<T, EngineError>) -> Result<T, EngineError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(observability::OPERATIONS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
    result
}
