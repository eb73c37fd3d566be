//! Field bounds and operational limits.

// ── Room types ───────────────────────────────────────────────────
pub const MAX_ROOM_TYPE_NAME_LEN: usize = 50;

/// Descriptions and notes on room types and rooms.
pub const MAX_TEXT_LEN: usize = 200;

// ── Rooms ────────────────────────────────────────────────────────
pub const MAX_ROOM_NUMBER_LEN: usize = 20;
pub const MIN_ROOM_CAPACITY: u8 = 1;
pub const MAX_ROOM_CAPACITY: u8 = 10;

// ── Customers ────────────────────────────────────────────────────
pub const MAX_FULL_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MIN_PHONE_LEN: usize = 10;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_CUSTOMER_AGE_YEARS: u32 = 120;

// ── Bookings ─────────────────────────────────────────────────────
pub const MIN_STAY_NIGHTS: i64 = 1;
pub const MAX_STAY_NIGHTS: i64 = 365;

// ── Locking ──────────────────────────────────────────────────────
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Read paths retry a timed-out lock acquisition this many times.
pub const READ_RETRY_ATTEMPTS: u32 = 3;
pub const READ_RETRY_BASE_DELAY_MS: u64 = 10;

// ── Write-ahead log ──────────────────────────────────────────────

/// Largest payload a WAL frame may carry. Longer length prefixes are treated as corruption.
pub const MAX_FRAME_LEN: usize = 1 << 20;
