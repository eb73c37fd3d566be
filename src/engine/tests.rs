use super::*;
use chrono::{Days, NaiveDate, Utc};

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("innkeep_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn open(path: &PathBuf) -> Engine {
    Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap()
}

/// `n` days from today.
fn day(n: u64) -> NaiveDate {
    today() + Days::new(n)
}

fn room_type_input(name: &str) -> RoomTypeInput {
    RoomTypeInput {
        name: name.into(),
        description: format!("{name} rooms"),
        note: String::new(),
    }
}

fn room_input(number: &str, room_type_id: RoomTypeId, cents: i64) -> RoomInput {
    RoomInput {
        number: number.into(),
        description: "Courtyard view".into(),
        max_capacity: 2,
        nightly_rate: Money::from_cents(cents),
        room_type_id,
    }
}

fn customer_input(full_name: &str, email: &str) -> CustomerInput {
    CustomerInput {
        full_name: full_name.into(),
        phone: "+44 20 7946 0958".into(),
        email: email.into(),
        birthday: NaiveDate::from_ymd_opt(1988, 4, 2).unwrap(),
    }
}

fn request(customer_id: CustomerId, room_id: RoomId, from: u64, to: u64) -> BookingRequest {
    BookingRequest {
        customer_id,
        room_id,
        start: day(from),
        end: day(to),
        channel: Channel::Online,
    }
}

struct Hotel {
    engine: Engine,
    room_type: RoomType,
    rooms: Vec<Room>,
    guest: Customer,
}

/// One room type, rooms "101".. at 100.00 a night, one guest.
async fn hotel(name: &str, room_count: usize) -> Hotel {
    let engine = open(&test_wal_path(name));
    let room_type = engine.create_room_type(room_type_input("Standard")).await.unwrap();
    let mut rooms = Vec::new();
    for i in 0..room_count {
        let number = format!("{}", 101 + i);
        rooms.push(engine.create_room(room_input(&number, room_type.id, 10_000)).await.unwrap());
    }
    let guest = engine
        .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
        .await
        .unwrap();
    Hotel {
        engine,
        room_type,
        rooms,
        guest,
    }
}

fn ids(rooms: &[Room]) -> Vec<RoomId> {
    rooms.iter().map(|r| r.id).collect()
}

// ── Booking lifecycle ────────────────────────────────────

#[tokio::test]
async fn room_101_example() {
    let h = hotel("room_101.wal", 2).await;
    let (r101, r102) = (h.rooms[0].id, h.rooms[1].id);

    let first = h.engine.create_booking(request(h.guest.id, r101, 10, 12)).await.unwrap();

    // Checks in the day the first guest checks out.
    h.engine.create_booking(request(h.guest.id, r101, 12, 14)).await.unwrap();

    let err = h.engine.create_booking(request(h.guest.id, r101, 11, 13)).await.unwrap_err();
    match err {
        EngineError::Conflict { booking_id, stay } => {
            assert_eq!(booking_id, first.id);
            assert_eq!(stay, Stay::new(day(10), day(12)));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let free = h
        .engine
        .available_rooms(day(11), day(13), AvailabilityFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(&free), vec![r102]);

    let free = h
        .engine
        .available_rooms(day(14), day(16), AvailabilityFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(&free), vec![r101, r102]);
}

#[tokio::test]
async fn price_is_rate_times_nights() {
    let h = hotel("price.wal", 0).await;
    let room = h
        .engine
        .create_room(room_input("201", h.room_type.id, 12_050))
        .await
        .unwrap();

    let booking = h.engine.create_booking(request(h.guest.id, room.id, 3, 6)).await.unwrap();
    assert_eq!(booking.nights, 3);
    assert_eq!(booking.total_price, Money::from_cents(36_150));
    assert_eq!(booking.status, BookingStatus::Active);
    assert_eq!(booking.channel, Channel::Online);
    assert_eq!(booking.total_price.to_string(), "361.50");
}

#[tokio::test]
async fn rate_change_does_not_reprice_existing_bookings() {
    let h = hotel("reprice.wal", 1).await;
    let room = &h.rooms[0];
    let booking = h.engine.create_booking(request(h.guest.id, room.id, 1, 3)).await.unwrap();

    let mut input = room_input(&room.number, h.room_type.id, 99_900);
    input.description = room.description.clone();
    h.engine.update_room(room.id, input).await.unwrap();

    let stored = h.engine.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.booking.total_price, Money::from_cents(20_000));
    assert_eq!(stored.room.nightly_rate, Money::from_cents(99_900));
}

#[tokio::test]
async fn invalid_stays_are_rejected_without_writing() {
    let h = hotel("invalid_stay.wal", 1).await;
    let room = h.rooms[0].id;
    let before = h.engine.wal_appends_since_compact().await;

    let past = BookingRequest {
        start: today() - Days::new(1),
        ..request(h.guest.id, room, 0, 2)
    };
    let cases = [
        (past, "start"),
        (request(h.guest.id, room, 5, 5), "end"),
        (request(h.guest.id, room, 5, 4), "end"),
        (request(h.guest.id, room, 1, 367), "end"),
    ];
    for (req, expected) in cases {
        match h.engine.create_booking(req).await {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected validation error on {expected}, got {other:?}"),
        }
    }

    assert!(h.engine.list_bookings().await.unwrap().is_empty());
    assert_eq!(h.engine.wal_appends_since_compact().await, before);
}

#[tokio::test]
async fn longest_stay_is_a_year() {
    let h = hotel("long_stay.wal", 1).await;
    let booking = h
        .engine
        .create_booking(request(h.guest.id, h.rooms[0].id, 1, 366))
        .await
        .unwrap();
    assert_eq!(booking.nights, 365);
}

#[tokio::test]
async fn booking_needs_active_customer_and_room() {
    let h = hotel("booking_refs.wal", 2).await;
    let (r101, r102) = (h.rooms[0].id, h.rooms[1].id);

    let err = h.engine.create_booking(request(999, r101, 1, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Customer, id: 999 }));

    let err = h.engine.create_booking(request(h.guest.id, 999, 1, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Room, id: 999 }));

    h.engine.delete_room(r102).await.unwrap();
    let err = h.engine.create_booking(request(h.guest.id, r102, 1, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Room, .. }));

    let gone = h
        .engine
        .create_customer(customer_input("Charles Babbage", "charles@example.com"))
        .await
        .unwrap();
    h.engine.delete_customer(gone.id).await.unwrap();
    let err = h.engine.create_booking(request(gone.id, r101, 1, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Customer, .. }));
}

#[tokio::test]
async fn update_own_dates_never_conflicts_with_itself() {
    let h = hotel("update_self.wal", 1).await;
    let room = h.rooms[0].id;
    let booking = h.engine.create_booking(request(h.guest.id, room, 5, 8)).await.unwrap();

    let longer = h
        .engine
        .update_booking(booking.id, request(h.guest.id, room, 4, 9))
        .await
        .unwrap();
    assert_eq!(longer.stay, Stay::new(day(4), day(9)));
    assert_eq!(longer.nights, 5);
    assert_eq!(longer.total_price, Money::from_cents(50_000));
    assert_eq!(longer.booked_at, booking.booked_at);

    let bookings = h.engine.bookings_by_room(room).await.unwrap();
    assert_eq!(bookings.len(), 1);
}

#[tokio::test]
async fn update_into_another_booking_conflicts() {
    let h = hotel("update_conflict.wal", 1).await;
    let room = h.rooms[0].id;
    let early = h.engine.create_booking(request(h.guest.id, room, 1, 3)).await.unwrap();
    let late = h.engine.create_booking(request(h.guest.id, room, 5, 7)).await.unwrap();

    let err = h
        .engine
        .update_booking(early.id, request(h.guest.id, room, 2, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { booking_id, .. } if booking_id == late.id));

    // Unchanged after the rejected update.
    let stored = h.engine.get_booking(early.id).await.unwrap().booking;
    assert_eq!(stored, early);
}

#[tokio::test]
async fn update_moves_booking_between_rooms() {
    let h = hotel("update_move.wal", 1).await;
    let from = h.rooms[0].id;
    let suite = h
        .engine
        .create_room(room_input("PH1", h.room_type.id, 30_000))
        .await
        .unwrap();
    let booking = h.engine.create_booking(request(h.guest.id, from, 2, 4)).await.unwrap();

    let moved = h
        .engine
        .update_booking(booking.id, request(h.guest.id, suite.id, 2, 4))
        .await
        .unwrap();
    assert_eq!(moved.room_id, suite.id);
    assert_eq!(moved.total_price, Money::from_cents(60_000));
    assert_eq!(moved.id, booking.id);

    assert!(h.engine.bookings_by_room(from).await.unwrap().is_empty());
    let in_suite = h.engine.bookings_by_room(suite.id).await.unwrap();
    assert_eq!(in_suite.len(), 1);
    assert_eq!(in_suite[0].room.id, suite.id);

    let free = h
        .engine
        .available_rooms(day(2), day(4), AvailabilityFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(&free), vec![from]);
}

#[tokio::test]
async fn move_into_occupied_room_conflicts() {
    let h = hotel("move_conflict.wal", 2).await;
    let (a, b) = (h.rooms[0].id, h.rooms[1].id);
    let mine = h.engine.create_booking(request(h.guest.id, a, 1, 3)).await.unwrap();
    let theirs = h.engine.create_booking(request(h.guest.id, b, 2, 5)).await.unwrap();

    let err = h
        .engine
        .update_booking(mine.id, request(h.guest.id, b, 1, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { booking_id, .. } if booking_id == theirs.id));
    assert_eq!(h.engine.get_booking(mine.id).await.unwrap().booking.room_id, a);
}

#[tokio::test]
async fn update_can_change_customer() {
    let h = hotel("update_customer.wal", 1).await;
    let other = h
        .engine
        .create_customer(customer_input("Mary Somerville", "mary@example.com"))
        .await
        .unwrap();
    let booking = h.engine.create_booking(request(h.guest.id, h.rooms[0].id, 1, 2)).await.unwrap();

    h.engine
        .update_booking(booking.id, request(other.id, h.rooms[0].id, 1, 2))
        .await
        .unwrap();
    assert!(h.engine.bookings_by_customer(h.guest.id).await.unwrap().is_empty());
    let theirs = h.engine.bookings_by_customer(other.id).await.unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].customer.email, "mary@example.com");
}

#[tokio::test]
async fn only_active_bookings_can_be_updated() {
    let h = hotel("update_terminal.wal", 1).await;
    let room = h.rooms[0].id;
    let booking = h.engine.create_booking(request(h.guest.id, room, 1, 2)).await.unwrap();
    h.engine.cancel_booking(booking.id).await.unwrap();

    let err = h
        .engine
        .update_booking(booking.id, request(h.guest.id, room, 3, 4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition { status: BookingStatus::Cancelled, .. }
    ));

    let err = h
        .engine
        .update_booking(4242, request(h.guest.id, room, 3, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Booking, id: 4242 }));
}

#[tokio::test]
async fn status_transitions() {
    let h = hotel("transitions.wal", 1).await;
    let room = h.rooms[0].id;
    let a = h.engine.create_booking(request(h.guest.id, room, 1, 2)).await.unwrap();
    let b = h.engine.create_booking(request(h.guest.id, room, 2, 3)).await.unwrap();

    let cancelled = h.engine.cancel_booking(a.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    // Cancelling twice is a no-op.
    let appends = h.engine.wal_appends_since_compact().await;
    let again = h.engine.cancel_booking(a.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Cancelled);
    assert_eq!(h.engine.wal_appends_since_compact().await, appends);

    let err = h.engine.complete_booking(a.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { status: BookingStatus::Cancelled, .. }));

    let completed = h.engine.complete_booking(b.id).await.unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    let err = h.engine.cancel_booking(b.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { status: BookingStatus::Completed, .. }));
    let err = h.engine.complete_booking(b.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { status: BookingStatus::Completed, .. }));

    let err = h.engine.cancel_booking(777).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: EntityKind::Booking, id: 777 }));
}

#[tokio::test]
async fn cancelled_and_completed_bookings_free_the_room() {
    let h = hotel("terminal_frees.wal", 1).await;
    let room = h.rooms[0].id;
    let a = h.engine.create_booking(request(h.guest.id, room, 1, 4)).await.unwrap();
    h.engine.cancel_booking(a.id).await.unwrap();
    let b = h.engine.create_booking(request(h.guest.id, room, 1, 4)).await.unwrap();
    h.engine.complete_booking(b.id).await.unwrap();
    h.engine.create_booking(request(h.guest.id, room, 2, 3)).await.unwrap();

    // History keeps all three.
    assert_eq!(h.engine.bookings_by_room(room).await.unwrap().len(), 3);
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_creates_have_one_winner() {
    let h = hotel("race.wal", 1).await;
    let engine = Arc::new(h.engine);
    let room = h.rooms[0].id;

    let n = 16;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        let guest = h.guest.id;
        // Every request covers night 5.
        handles.push(tokio::spawn(async move {
            eng.create_booking(request(guest, room, 5 - (i % 3), 6 + (i % 2)))
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(engine.list_bookings().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_on_distinct_rooms_all_commit() {
    let h = hotel("group_commit.wal", 8).await;
    let engine = Arc::new(h.engine);

    let mut handles = Vec::new();
    for room in &h.rooms {
        let eng = engine.clone();
        let (guest, room) = (h.guest.id, room.id);
        handles.push(tokio::spawn(async move {
            eng.create_booking(request(guest, room, 1, 3)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let free = engine
        .available_rooms(day(1), day(3), AvailabilityFilter::default())
        .await
        .unwrap();
    assert!(free.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crossing_room_moves_do_not_deadlock() {
    let h = hotel("cross_moves.wal", 2).await;
    let engine = Arc::new(h.engine);
    let (a, b) = (h.rooms[0].id, h.rooms[1].id);
    let guest = h.guest.id;

    let in_a = engine.create_booking(request(guest, a, 1, 2)).await.unwrap();
    let in_b = engine.create_booking(request(guest, b, 5, 6)).await.unwrap();

    let mut handles = Vec::new();
    for round in 0..10u64 {
        let (to_b, to_a) = if round % 2 == 0 { (b, a) } else { (a, b) };
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.update_booking(in_a.id, request(guest, to_b, 1, 2)).await
        }));
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.update_booking(in_b.id, request(guest, to_a, 5, 6)).await
        }));
    }

    // A booking that keeps moving can exhaust its lookup retries; that is
    // a timeout, never a hang.
    let all = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) | Err(EngineError::Timeout(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
    })
    .await;
    assert!(all.is_ok(), "room moves deadlocked");
    assert_eq!(engine.list_bookings().await.unwrap().len(), 2);
}

#[tokio::test]
async fn held_room_lock_times_out_writes_and_reads() {
    let path = test_wal_path("lock_timeout.wal");
    let engine = open(&path).with_lock_timeout(std::time::Duration::from_millis(30));
    let rt = engine.create_room_type(room_type_input("Standard")).await.unwrap();
    let room = engine.create_room(room_input("101", rt.id, 10_000)).await.unwrap();
    let guest = engine
        .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
        .await
        .unwrap();

    let rs = engine.store().room(&room.id).unwrap();
    let held = rs.write_owned().await;

    let err = engine.create_booking(request(guest.id, room.id, 1, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    let err = engine.get_room(room.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));

    drop(held);
    engine.create_booking(request(guest.id, room.id, 1, 2)).await.unwrap();
    assert_eq!(engine.bookings_by_room(room.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn booking_writes_wait_for_directory_writes() {
    let path = test_wal_path("directory_gate.wal");
    let engine = open(&path).with_lock_timeout(std::time::Duration::from_millis(30));
    let rt = engine.create_room_type(room_type_input("Standard")).await.unwrap();
    let room = engine.create_room(room_input("101", rt.id, 10_000)).await.unwrap();
    let guest = engine
        .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
        .await
        .unwrap();
    let booking = engine.create_booking(request(guest.id, room.id, 1, 2)).await.unwrap();

    // A customer delete in flight holds the directory exclusively.
    let dir = engine.directory_guard().await.unwrap();
    assert!(matches!(
        engine.create_booking(request(guest.id, room.id, 3, 4)).await,
        Err(EngineError::Timeout("directory lock"))
    ));
    assert!(matches!(
        engine.update_booking(booking.id, request(guest.id, room.id, 5, 6)).await,
        Err(EngineError::Timeout("directory lock"))
    ));
    drop(dir);

    engine.delete_customer(guest.id).await.unwrap();
    assert!(matches!(
        engine.create_booking(request(guest.id, room.id, 3, 4)).await,
        Err(EngineError::NotFound { kind: EntityKind::Customer, .. })
    ));
    assert_eq!(engine.bookings_by_room(room.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn elapsed_sweep_keeps_progress_made_before_a_failure() {
    let path = test_wal_path("sweep_partial.wal");
    let engine = open(&path).with_lock_timeout(std::time::Duration::from_millis(30));
    let rt = engine.create_room_type(room_type_input("Standard")).await.unwrap();
    let a = engine.create_room(room_input("101", rt.id, 10_000)).await.unwrap();
    let b = engine.create_room(room_input("102", rt.id, 10_000)).await.unwrap();
    let guest = engine
        .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
        .await
        .unwrap();
    let first = engine.create_booking(request(guest.id, a.id, 0, 2)).await.unwrap();
    let second = engine.create_booking(request(guest.id, b.id, 0, 2)).await.unwrap();

    let held = engine.store().room(&b.id).unwrap().write_owned().await;
    let err = engine.complete_elapsed_bookings(day(3)).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    drop(held);

    let first = engine.get_booking(first.id).await.unwrap().booking;
    assert_eq!(first.status, BookingStatus::Completed);
    assert_eq!(engine.complete_elapsed_bookings(day(3)).await.unwrap(), vec![second.id]);
    assert!(engine.complete_elapsed_bookings(day(3)).await.unwrap().is_empty());
}

// ── Directory ────────────────────────────────────────────

#[tokio::test]
async fn natural_keys_are_unique() {
    let h = hotel("unique_keys.wal", 1).await;

    let err = h.engine.create_room_type(room_type_input("STANDARD")).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { field: "name", .. }));

    let err = h
        .engine
        .create_room(room_input("101", h.room_type.id, 5_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { field: "number", .. }));

    let err = h
        .engine
        .create_customer(customer_input("Someone Else", "ADA@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { field: "email", .. }));

    // Keeping your own key on update is fine.
    h.engine
        .update_customer(h.guest.id, customer_input("Augusta Ada King", "ada@example.com"))
        .await
        .unwrap();

    // Deleting frees the number and the email.
    h.engine.delete_room(h.rooms[0].id).await.unwrap();
    let reused = h
        .engine
        .create_room(room_input("101", h.room_type.id, 5_000))
        .await
        .unwrap();
    assert_ne!(reused.id, h.rooms[0].id);
    h.engine.delete_customer(h.guest.id).await.unwrap();
    h.engine
        .create_customer(customer_input("Ada Two", "ada@example.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn renaming_into_another_key_is_rejected() {
    let h = hotel("rename_dup.wal", 2).await;
    let err = h
        .engine
        .update_room(h.rooms[1].id, room_input("101", h.room_type.id, 10_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { field: "number", .. }));
    assert_eq!(h.engine.get_room(h.rooms[1].id).await.unwrap().number, "102");
}

#[tokio::test]
async fn room_type_delete_is_refused_while_referenced() {
    let h = hotel("room_type_in_use.wal", 1).await;
    let err = h.engine.delete_room_type(h.room_type.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InUse { kind: EntityKind::RoomType, .. }));

    // A soft-deleted room still references its type.
    h.engine.delete_room(h.rooms[0].id).await.unwrap();
    assert!(matches!(
        h.engine.delete_room_type(h.room_type.id).await,
        Err(EngineError::InUse { .. })
    ));

    let spare = h.engine.create_room_type(room_type_input("Spare")).await.unwrap();
    h.engine.delete_room_type(spare.id).await.unwrap();
    assert!(matches!(
        h.engine.get_room_type(spare.id),
        Err(EngineError::NotFound { kind: EntityKind::RoomType, .. })
    ));
    assert!(matches!(
        h.engine.delete_room_type(spare.id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn directory_validation() {
    let h = hotel("directory_validation.wal", 0).await;

    let mut bad = room_input("301", h.room_type.id, 10_000);
    bad.max_capacity = 0;
    assert!(matches!(
        h.engine.create_room(bad).await,
        Err(EngineError::Validation { field: "max_capacity", .. })
    ));

    assert!(matches!(
        h.engine.create_room(room_input("301", h.room_type.id, -1)).await,
        Err(EngineError::Validation { field: "nightly_rate", .. })
    ));

    assert!(matches!(
        h.engine.create_room(room_input("301", 99, 10_000)).await,
        Err(EngineError::NotFound { kind: EntityKind::RoomType, id: 99 })
    ));

    assert!(matches!(
        h.engine.create_customer(customer_input("No Mail", "not-an-email")).await,
        Err(EngineError::Validation { field: "email", .. })
    ));

    let mut unborn = customer_input("Future Kid", "kid@example.com");
    unborn.birthday = day(1);
    assert!(matches!(
        h.engine.create_customer(unborn).await,
        Err(EngineError::Validation { field: "birthday", .. })
    ));

    assert!(matches!(
        h.engine.create_room_type(room_type_input(&"x".repeat(51))).await,
        Err(EngineError::Validation { field: "name", .. })
    ));
}

#[tokio::test]
async fn deleted_records_leave_listings_but_resolve_in_history() {
    let h = hotel("soft_delete.wal", 2).await;
    let (r101, r102) = (h.rooms[0].id, h.rooms[1].id);
    let booking = h.engine.create_booking(request(h.guest.id, r101, 1, 3)).await.unwrap();

    h.engine.delete_room(r101).await.unwrap();
    h.engine.delete_customer(h.guest.id).await.unwrap();

    assert_eq!(ids(&h.engine.list_rooms().await.unwrap()), vec![r102]);
    assert!(h.engine.list_customers().is_empty());
    assert!(h.engine.customer_by_email("ada@example.com").is_none());
    assert_eq!(h.engine.get_room(r101).await.unwrap().status, RoomStatus::Deleted);
    assert_eq!(h.engine.get_customer(h.guest.id).unwrap().status, CustomerStatus::Deleted);

    let history = h.engine.bookings_by_customer(h.guest.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].booking.id, booking.id);
    assert_eq!(history[0].room.status, RoomStatus::Deleted);
    assert_eq!(history[0].customer.status, CustomerStatus::Deleted);

    let free = h
        .engine
        .available_rooms(day(5), day(6), AvailabilityFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(&free), vec![r102]);

    // Deleted records cannot be edited or deleted again.
    assert!(matches!(
        h.engine.update_room(r101, room_input("101", h.room_type.id, 1)).await,
        Err(EngineError::NotFound { kind: EntityKind::Room, .. })
    ));
    assert!(matches!(
        h.engine.delete_customer(h.guest.id).await,
        Err(EngineError::NotFound { kind: EntityKind::Customer, .. })
    ));
}

#[tokio::test]
async fn searches_are_case_insensitive_substrings() {
    let h = hotel("search.wal", 1).await;
    let mut sea = room_input("301", h.room_type.id, 15_000);
    sea.description = "Sea view with balcony".into();
    let sea = h.engine.create_room(sea).await.unwrap();
    h.engine.create_room_type(room_type_input("Deluxe Suite")).await.unwrap();
    h.engine
        .create_customer(customer_input("Grace Hopper", "grace@navy.mil"))
        .await
        .unwrap();

    assert_eq!(ids(&h.engine.search_rooms("SEA VIEW").await.unwrap()), vec![sea.id]);
    assert_eq!(h.engine.search_rooms("").await.unwrap().len(), 2);
    assert_eq!(h.engine.search_customers("hopper").len(), 1);
    assert_eq!(h.engine.search_customers("NAVY").len(), 1);
    assert_eq!(h.engine.search_customers("7946").len(), 2);
    assert_eq!(h.engine.search_room_types("suite").len(), 1);
    assert!(h.engine.search_room_types("penthouse").is_empty());

    let by_type = h.engine.rooms_by_type(h.room_type.id).await.unwrap();
    assert_eq!(by_type.len(), 2);
    assert!(matches!(
        h.engine.rooms_by_type(42).await,
        Err(EngineError::NotFound { kind: EntityKind::RoomType, .. })
    ));
}

// ── Reads & availability ─────────────────────────────────

#[tokio::test]
async fn booking_reads_resolve_and_filter() {
    let h = hotel("booking_reads.wal", 2).await;
    let (a, b) = (h.rooms[0].id, h.rooms[1].id);
    let online = h.engine.create_booking(request(h.guest.id, a, 5, 7)).await.unwrap();
    let offline = h
        .engine
        .create_booking(BookingRequest {
            channel: Channel::Offline,
            ..request(h.guest.id, b, 1, 3)
        })
        .await
        .unwrap();
    let cancelled = h.engine.create_booking(request(h.guest.id, b, 8, 9)).await.unwrap();
    h.engine.cancel_booking(cancelled.id).await.unwrap();

    let all = h.engine.list_bookings().await.unwrap();
    let order: Vec<_> = all.iter().map(|d| d.booking.id).collect();
    assert_eq!(order, vec![offline.id, online.id, cancelled.id]);
    assert!(all.iter().all(|d| d.customer.id == h.guest.id));

    let details = h.engine.get_booking(online.id).await.unwrap();
    assert_eq!(details.room.number, "101");
    assert_eq!(details.customer.full_name, "Ada Lovelace");

    let off = h.engine.bookings_by_channel(Channel::Offline).await.unwrap();
    assert_eq!(off.len(), 1);
    assert_eq!(off[0].booking.id, offline.id);

    // Overlap semantics, any status.
    let range = h.engine.bookings_by_date_range(day(3), day(9)).await.unwrap();
    let hit: Vec<_> = range.iter().map(|d| d.booking.id).collect();
    assert_eq!(hit, vec![online.id, cancelled.id]);

    let utc_today = Utc::now().date_naive();
    let made_today = h.engine.bookings_booked_between(utc_today, utc_today).await.unwrap();
    assert_eq!(made_today.len(), 3);

    assert!(matches!(
        h.engine.bookings_by_date_range(day(3), day(3)).await,
        Err(EngineError::Validation { .. })
    ));
    assert!(matches!(
        h.engine.bookings_by_customer(555).await,
        Err(EngineError::NotFound { kind: EntityKind::Customer, .. })
    ));
    assert!(matches!(
        h.engine.bookings_by_room(555).await,
        Err(EngineError::NotFound { kind: EntityKind::Room, .. })
    ));
}

#[tokio::test]
async fn booking_summary_counts_bookings_made_in_range() {
    let h = hotel("summary.wal", 2).await;
    let (a, b) = (h.rooms[0].id, h.rooms[1].id);
    h.engine.create_booking(request(h.guest.id, a, 1, 3)).await.unwrap();
    h.engine
        .create_booking(BookingRequest {
            channel: Channel::Offline,
            ..request(h.guest.id, b, 1, 4)
        })
        .await
        .unwrap();
    let cancelled = h.engine.create_booking(request(h.guest.id, a, 5, 6)).await.unwrap();
    h.engine.cancel_booking(cancelled.id).await.unwrap();
    let done = h.engine.create_booking(request(h.guest.id, b, 6, 7)).await.unwrap();
    h.engine.complete_booking(done.id).await.unwrap();

    let utc_today = Utc::now().date_naive();
    let summary = h.engine.booking_summary(utc_today, utc_today).await.unwrap();
    assert_eq!(
        summary,
        BookingSummary {
            total_revenue: Money::from_cents(70_000),
            total: 4,
            active: 2,
            completed: 1,
            cancelled: 1,
            online: 3,
            offline: 1,
        }
    );

    let later = utc_today + Days::new(1);
    assert_eq!(
        h.engine.booking_summary(later, later + Days::new(30)).await.unwrap(),
        BookingSummary::default()
    );
    assert!(matches!(
        h.engine.booking_summary(utc_today, utc_today - Days::new(1)).await,
        Err(EngineError::Validation { .. })
    ));
}

#[tokio::test]
async fn availability_filters_and_validation() {
    let h = hotel("availability_filter.wal", 1).await;
    let suite_type = h.engine.create_room_type(room_type_input("Suite")).await.unwrap();
    let mut family = room_input("401", suite_type.id, 40_000);
    family.max_capacity = 6;
    let family = h.engine.create_room(family).await.unwrap();

    let suites = AvailabilityFilter {
        room_type_id: Some(suite_type.id),
        min_capacity: None,
    };
    assert_eq!(ids(&h.engine.available_rooms(day(1), day(2), suites).await.unwrap()), vec![family.id]);

    let big = AvailabilityFilter {
        room_type_id: None,
        min_capacity: Some(3),
    };
    assert_eq!(ids(&h.engine.available_rooms(day(1), day(2), big).await.unwrap()), vec![family.id]);

    assert!(matches!(
        h.engine.available_rooms(day(2), day(2), AvailabilityFilter::default()).await,
        Err(EngineError::Validation { field: "end", .. })
    ));
    assert!(matches!(
        h.engine
            .available_rooms(today() - Days::new(1), day(2), AvailabilityFilter::default())
            .await,
        Err(EngineError::Validation { field: "start", .. })
    ));
}

#[tokio::test]
async fn room_subscribers_hear_commits() {
    let h = hotel("notify.wal", 2).await;
    let mut rx = h.engine.notify.subscribe_room(h.rooms[0].id);

    h.engine.create_booking(request(h.guest.id, h.rooms[1].id, 1, 2)).await.unwrap();
    let booking = h.engine.create_booking(request(h.guest.id, h.rooms[0].id, 1, 2)).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), Event::BookingCreated(booking));
    assert!(rx.try_recv().is_err());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn wal_replay_restores_state_indexes_and_ids() {
    let path = test_wal_path("replay.wal");
    let (room_id, guest_id, kept, moved_to) = {
        let engine = open(&path);
        let rt = engine.create_room_type(room_type_input("Standard")).await.unwrap();
        let room = engine.create_room(room_input("101", rt.id, 10_000)).await.unwrap();
        let other = engine.create_room(room_input("102", rt.id, 12_000)).await.unwrap();
        let guest = engine
            .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
            .await
            .unwrap();
        let kept = engine.create_booking(request(guest.id, room.id, 1, 3)).await.unwrap();
        let moved = engine.create_booking(request(guest.id, room.id, 4, 6)).await.unwrap();
        engine.update_booking(moved.id, request(guest.id, other.id, 4, 6)).await.unwrap();
        let cancelled = engine.create_booking(request(guest.id, room.id, 7, 8)).await.unwrap();
        engine.cancel_booking(cancelled.id).await.unwrap();
        (room.id, guest.id, kept, other.id)
    };

    let engine = open(&path);
    let bookings = engine.list_bookings().await.unwrap();
    assert_eq!(bookings.len(), 3);
    assert_eq!(engine.get_booking(kept.id).await.unwrap().booking, kept);
    assert_eq!(engine.bookings_by_room(moved_to).await.unwrap().len(), 1);
    assert_eq!(engine.bookings_by_customer(guest_id).await.unwrap().len(), 3);
    assert_eq!(engine.customer_by_email("ADA@example.com").unwrap().id, guest_id);

    // Conflicts still enforced, uniqueness still enforced, ids keep counting.
    assert!(matches!(
        engine.create_booking(request(guest_id, room_id, 2, 4)).await,
        Err(EngineError::Conflict { .. })
    ));
    assert!(matches!(
        engine.create_room(room_input("101", 1, 10_000)).await,
        Err(EngineError::DuplicateKey { .. })
    ));
    let next = engine.create_booking(request(guest_id, room_id, 10, 11)).await.unwrap();
    assert!(bookings.iter().all(|d| d.booking.id < next.id));
}

#[tokio::test]
async fn compaction_preserves_state_and_never_reuses_ids() {
    let path = test_wal_path("compaction.wal");
    let (snapshot, last_type_id) = {
        let engine = open(&path);
        let rt = engine.create_room_type(room_type_input("Standard")).await.unwrap();
        let room = engine.create_room(room_input("101", rt.id, 10_000)).await.unwrap();
        let guest = engine
            .create_customer(customer_input("Ada Lovelace", "ada@example.com"))
            .await
            .unwrap();
        for i in 0..5 {
            let b = engine.create_booking(request(guest.id, room.id, i, i + 1)).await.unwrap();
            if i % 2 == 0 {
                engine.cancel_booking(b.id).await.unwrap();
            }
        }
        let doomed = engine.create_room_type(room_type_input("Doomed")).await.unwrap();
        engine.delete_room_type(doomed.id).await.unwrap();
        engine.delete_room(room.id).await.unwrap();

        let before = std::fs::metadata(&path).unwrap().len();
        engine.compact_wal().await.unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() < before);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        (engine.list_bookings().await.unwrap(), doomed.id)
    };

    let engine = open(&path);
    assert_eq!(engine.list_bookings().await.unwrap(), snapshot);
    assert!(engine.list_rooms().await.unwrap().is_empty());
    assert_eq!(engine.list_room_types().len(), 1);

    let fresh = engine.create_room_type(room_type_input("Fresh")).await.unwrap();
    assert!(fresh.id > last_type_id);
}

#[tokio::test]
async fn torn_tail_is_cut_before_new_commits() {
    let path = test_wal_path("torn_tail.wal");
    {
        let engine = open(&path);
        engine.create_room_type(room_type_input("Standard")).await.unwrap();
    }
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[64, 0, 0, 0, 1, 2, 3]).unwrap(); // crash mid-frame
    }
    {
        let engine = open(&path);
        assert_eq!(engine.list_room_types().len(), 1);
        engine.create_room_type(room_type_input("Deluxe")).await.unwrap();
    }

    let engine = open(&path);
    let names: Vec<String> = engine.list_room_types().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Standard", "Deluxe"]);
}

#[tokio::test]
async fn second_engine_on_the_same_log_is_refused() {
    let path = test_wal_path("single_owner.wal");
    let first = open(&path);
    first.create_room_type(room_type_input("Standard")).await.unwrap();

    match Engine::new(path.clone(), Arc::new(NotifyHub::new())) {
        Ok(_) => panic!("a second engine opened a log that is already owned"),
        Err(e) => assert_eq!(e.kind(), io::ErrorKind::WouldBlock),
    }

    drop(first);
    let reopened = open(&path);
    assert_eq!(reopened.list_room_types().len(), 1);
}

#[test]
fn failed_batch_leaves_nothing_behind() {
    let path = test_wal_path("failed_batch.wal");
    let room_type = |id: RoomTypeId, name: String| {
        Event::RoomTypeCreated(RoomType {
            id,
            name,
            description: String::new(),
            note: String::new(),
        })
    };
    let kept = room_type(1, "Standard".into());
    let mut wal = Wal::open(&path).unwrap();
    wal.append_buffered(&kept).unwrap();
    wal.flush_sync().unwrap();

    let (ok_tx, mut ok_rx) = oneshot::channel();
    let (big_tx, mut big_rx) = oneshot::channel();
    let mut batch = vec![
        (room_type(2, "Deluxe".into()), ok_tx),
        (room_type(3, "x".repeat(MAX_FRAME_LEN + 1)), big_tx),
    ];
    commit_batch(&mut wal, &mut batch);

    // Every caller in the batch is told it failed, and none of it is on disk.
    assert!(ok_rx.try_recv().unwrap().is_err());
    assert!(big_rx.try_recv().unwrap().is_err());
    assert_eq!(wal.appends_since_compact(), 1);
    drop(wal);
    assert_eq!(Wal::replay(&path).unwrap(), vec![kept]);
}
