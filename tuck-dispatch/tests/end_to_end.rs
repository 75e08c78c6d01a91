use std::sync::Arc;
use tokio::sync::mpsc;
use tuck_core::{EngineError, RecordStore};
use tuck_dispatch::{Engine, EngineSettings, LocationOutcome, TransitionOutcome};
use tuck_shared::{
    Actor, Availability, BookingStatus, LifecycleRequest, LocationReading, NewBooking, Outbound,
    PresenceStatus, Role,
};
use tuck_store::InMemoryRecordStore;

fn engine() -> (Arc<InMemoryRecordStore>, Arc<Engine>) {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = Engine::new(store.clone(), EngineSettings { subscriber_buffer: 256 }).unwrap();
    (store, Arc::new(engine))
}

fn new_booking() -> NewBooking {
    NewBooking {
        pickup: "Connaught Place".to_string(),
        dropoff: "Saket".to_string(),
        vehicle_type: "mini_truck".to_string(),
        amount_minor: 450,
        customer_notes: None,
        customer_phone: None,
    }
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

fn statuses(frames: &[Outbound]) -> Vec<BookingStatus> {
    frames
        .iter()
        .filter_map(|f| match f {
            Outbound::LifecycleChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_booking_end_to_end() {
    let (_store, engine) = engine();
    let customer = Actor::customer("cust-1");

    let mut admin = engine.register(Role::Admin, None).await.unwrap();
    let mut cust_conn = engine.register(Role::Customer, Some("cust-1".into())).await.unwrap();
    let mut d1_conn = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let mut d2_conn = engine.register(Role::Driver, Some("D2".into())).await.unwrap();
    drain(&mut admin.outbox);

    let booking = engine.create_booking(&customer, new_booking()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.amount_minor, 450);

    // Both online drivers hear about the new booking.
    for conn in [&mut d1_conn, &mut d2_conn] {
        let frames = drain(&mut conn.outbox);
        assert!(frames.iter().any(|f| matches!(f, Outbound::NewBookingAvailable { booking_id, .. } if *booking_id == booking.id)));
    }

    let assign = LifecycleRequest::Advance(BookingStatus::Assigned);
    let race = |driver: &'static str| {
        let engine = engine.clone();
        let booking_id = booking.id.clone();
        tokio::spawn(async move {
            (driver, engine.request_transition(&Actor::driver(driver), &booking_id, assign, None).await)
        })
    };
    let (a, b) = tokio::join!(race("D1"), race("D2"));
    let results = [a.unwrap(), b.unwrap()];

    let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).map(|(d, _)| *d).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0];
    let loser_err = results.iter().find_map(|(_, r)| r.as_ref().err()).unwrap();
    assert!(matches!(loser_err, EngineError::AlreadyAssigned { .. }));
    assert_eq!(loser_err.code(), "already_assigned");
    assert!(!loser_err.is_retryable());

    let driver = Actor::driver(winner);
    let steps = [
        BookingStatus::Accepted,
        BookingStatus::EnRoutePickup,
        BookingStatus::ArrivedPickup,
        BookingStatus::PickedUp,
        BookingStatus::EnRouteDropoff,
        BookingStatus::ArrivedDropoff,
        BookingStatus::Delivered,
        BookingStatus::Completed,
    ];
    for (i, step) in steps.iter().enumerate() {
        let reply = engine
            .request_transition(&driver, &booking.id, LifecycleRequest::Advance(*step), None)
            .await
            .unwrap();
        assert_eq!(reply.booking.status, *step);
        assert!(!reply.noop);

        if i == 0 {
            // Cancelling once the driver has accepted is refused.
            let err = engine
                .request_transition(&customer, &booking.id, LifecycleRequest::Cancel, None)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_transition");
        }
    }

    let snapshot = engine.current_state(&booking.id).await.unwrap();
    assert_eq!(snapshot.booking.status, BookingStatus::Completed);
    assert_eq!(snapshot.booking.driver_id.as_deref(), Some(winner));
    assert!(snapshot.booking.completed_at.is_some());

    let mut expected = vec![BookingStatus::Assigned];
    expected.extend_from_slice(&steps);
    assert_eq!(statuses(&drain(&mut cust_conn.outbox)), expected);
    assert_eq!(statuses(&drain(&mut admin.outbox)), expected);

    let presence = engine.current_presence(winner).await.unwrap();
    assert_eq!(presence.status, PresenceStatus::Online);
    assert!(presence.current_booking_id.is_none());

    assert_eq!(engine.metrics().transitions(TransitionOutcome::Accepted), 9);
}

#[tokio::test]
async fn test_rejection_reaches_only_the_requester() {
    let (_store, engine) = engine();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();

    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();
    drain(&mut admin.outbox);

    let err = engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::PickedUp), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    match err.to_reply(Some(&booking.id)) {
        Outbound::TransitionRejected { code, retryable, .. } => {
            assert_eq!(code, "invalid_transition");
            assert!(!retryable);
        }
        other => panic!("unexpected reply {:?}", other),
    }

    assert!(drain(&mut admin.outbox).is_empty());
    assert_eq!(engine.metrics().transitions(TransitionOutcome::Rejected), 1);
}

#[tokio::test]
async fn test_store_failure_publishes_nothing_and_is_retryable() {
    let (store, engine) = engine();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    drain(&mut admin.outbox);

    store.fail_writes(true);
    let err = engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.code(), "store_unavailable");
    assert!(drain(&mut admin.outbox).is_empty());
    assert_eq!(engine.current_state(&booking.id).await.unwrap().booking.status, BookingStatus::Pending);

    store.fail_writes(false);
    let reply = engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();
    assert_eq!(reply.booking.status, BookingStatus::Assigned);
    assert_eq!(statuses(&drain(&mut admin.outbox)), vec![BookingStatus::Assigned]);
    assert_eq!(engine.metrics().transitions(TransitionOutcome::Failed), 1);
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    let (_store, engine) = engine();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();
    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    let driver = Actor::driver("D1");
    let assign = LifecycleRequest::Advance(BookingStatus::Assigned);
    let accept = LifecycleRequest::Advance(BookingStatus::Accepted);

    engine.request_transition(&driver, &booking.id, assign, None).await.unwrap();
    let first = engine.request_transition(&driver, &booking.id, accept, None).await.unwrap();
    drain(&mut admin.outbox);

    let replay = engine.request_transition(&driver, &booking.id, accept, None).await.unwrap();
    assert!(replay.noop);
    assert_eq!(replay.booking.last_transition_at, first.booking.last_transition_at);
    assert!(drain(&mut admin.outbox).is_empty());

    let stale = engine.request_transition(&driver, &booking.id, assign, None).await.unwrap_err();
    assert!(matches!(stale, EngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_presence_lifecycle() {
    let (store, engine) = engine();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();

    let first = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let second = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    assert_eq!(store.load_driver_presence("D1").await.unwrap().unwrap().status, PresenceStatus::Online);

    let frames = drain(&mut admin.outbox);
    assert!(matches!(frames.as_slice(), [Outbound::PresenceChanged { status: PresenceStatus::Online, .. }]));

    let updated = engine.set_presence("D1", Availability::Offline).await.unwrap();
    assert_eq!(updated.status, PresenceStatus::Offline);
    engine.set_presence("D1", Availability::Online).await.unwrap();
    drain(&mut admin.outbox);

    // Still one live connection, so the driver stays online.
    engine.unregister(first.subscription.id).await.unwrap();
    assert_eq!(store.load_driver_presence("D1").await.unwrap().unwrap().status, PresenceStatus::Online);

    engine.unregister(second.subscription.id).await.unwrap();
    engine.unregister(second.subscription.id).await.unwrap();
    assert_eq!(store.load_driver_presence("D1").await.unwrap().unwrap().status, PresenceStatus::Offline);
    assert!(matches!(
        drain(&mut admin.outbox).as_slice(),
        [Outbound::PresenceChanged { status: PresenceStatus::Offline, .. }]
    ));
}

#[tokio::test]
async fn test_busy_driver_survives_disconnect() {
    let (_store, engine) = engine();
    let conn = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();

    let err = engine.set_presence("D1", Availability::Offline).await.unwrap_err();
    assert!(matches!(err, EngineError::DriverBusy { .. }));

    engine.unregister(conn.subscription.id).await.unwrap();
    let presence = engine.current_presence("D1").await.unwrap();
    assert_eq!(presence.status, PresenceStatus::Busy);
    assert_eq!(presence.current_booking_id.as_deref(), Some(booking.id.as_str()));

    let active = engine.reconciler().active_booking_for_driver("D1").await.unwrap().unwrap();
    assert_eq!(active.id, booking.id);
}

#[tokio::test]
async fn test_driver_released_after_dropping_mid_trip_goes_offline() {
    let (store, engine) = engine();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();
    let conn = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();

    engine.unregister(conn.subscription.id).await.unwrap();
    assert_eq!(engine.registry().connections_of(Role::Driver, "D1"), 0);
    drain(&mut admin.outbox);

    engine
        .request_transition(&Actor::admin(), &booking.id, LifecycleRequest::Cancel, None)
        .await
        .unwrap();

    let presence = store.load_driver_presence("D1").await.unwrap().unwrap();
    assert_eq!(presence.status, PresenceStatus::Offline);
    assert!(presence.current_booking_id.is_none());
    assert!(drain(&mut admin.outbox)
        .iter()
        .any(|f| matches!(f, Outbound::PresenceChanged { status: PresenceStatus::Offline, .. })));

    // Coming back brings the driver online again.
    let _back = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    assert_eq!(engine.current_presence("D1").await.unwrap().status, PresenceStatus::Online);
}

#[tokio::test]
async fn test_driver_released_while_connected_goes_online() {
    let (store, engine) = engine();
    let _conn = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();
    engine
        .request_transition(&Actor::customer("cust-1"), &booking.id, LifecycleRequest::Cancel, None)
        .await
        .unwrap();

    let presence = store.load_driver_presence("D1").await.unwrap().unwrap();
    assert_eq!(presence.status, PresenceStatus::Online);
}

#[tokio::test]
async fn test_location_survives_engine_restart() {
    let (store, engine) = engine();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let reading = LocationReading { lat: 19.07, lng: 72.87, recorded_at: chrono::Utc::now() };
    engine.push_location("D1", reading).await.unwrap();

    let stored = store.load_driver_presence("D1").await.unwrap().unwrap();
    assert_eq!(stored.last_location, Some(reading));

    let restarted = Engine::new(store.clone(), EngineSettings::default()).unwrap();
    let snapshot = restarted.current_presence("D1").await.unwrap();
    assert_eq!(snapshot.location, Some(reading));
}

#[tokio::test]
async fn test_stale_location_is_not_written() {
    let (store, engine) = engine();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let now = chrono::Utc::now();
    let fresh = LocationReading { lat: 19.07, lng: 72.87, recorded_at: now };
    let stale = LocationReading { lat: 0.0, lng: 0.0, recorded_at: now - chrono::Duration::seconds(10) };

    engine.push_location("D1", fresh).await.unwrap();
    assert_eq!(engine.push_location("D1", stale).await.unwrap(), LocationOutcome::Stale);
    assert_eq!(store.load_driver_presence("D1").await.unwrap().unwrap().last_location, Some(fresh));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_booking_order_holds_across_concurrent_bookings() {
    let (_store, engine) = engine();
    let mut admin = engine.register(Role::Admin, None).await.unwrap();

    let mut tasks = Vec::new();
    let mut ids = Vec::new();
    let mut drivers = Vec::new();
    for i in 0..4 {
        let driver = format!("D{}", i);
        drivers.push(engine.register(Role::Driver, Some(driver.clone())).await.unwrap());
        let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
        ids.push(booking.id.clone());

        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let actor = Actor::driver(&driver);
            for status in BookingStatus::FORWARD.iter().skip(1) {
                engine
                    .request_transition(&actor, &booking.id, LifecycleRequest::Advance(*status), None)
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let frames = drain(&mut admin.outbox);
    let expected: Vec<BookingStatus> = BookingStatus::FORWARD.iter().skip(1).copied().collect();
    for id in ids {
        let seen: Vec<BookingStatus> = frames
            .iter()
            .filter_map(|f| match f {
                Outbound::LifecycleChanged { booking_id, status, .. } if *booking_id == id => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(seen, expected, "booking {}", id);
    }
}

#[tokio::test]
async fn test_location_reaches_booking_customer() {
    let (_store, engine) = engine();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();
    let mut owner = engine.register(Role::Customer, Some("cust-1".into())).await.unwrap();
    let mut stranger = engine.register(Role::Customer, Some("cust-2".into())).await.unwrap();

    let booking = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    engine
        .request_transition(&Actor::driver("D1"), &booking.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();
    drain(&mut owner.outbox);

    let now = chrono::Utc::now();
    let reading = LocationReading { lat: 28.53, lng: 77.21, recorded_at: now };
    assert_eq!(engine.push_location("D1", reading).await.unwrap(), LocationOutcome::Accepted);

    let frames = drain(&mut owner.outbox);
    assert!(matches!(
        frames.as_slice(),
        [Outbound::LocationChanged { driver_id, booking_id: Some(b), .. }] if driver_id == "D1" && *b == booking.id
    ));
    assert!(drain(&mut stranger.outbox).is_empty());

    let snapshot = engine.current_presence("D1").await.unwrap();
    assert_eq!(snapshot.location, Some(reading));
}

#[tokio::test]
async fn test_listing_queries() {
    let (_store, engine) = engine();
    let _d1 = engine.register(Role::Driver, Some("D1".into())).await.unwrap();

    let first = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = engine.create_booking(&Actor::customer("cust-1"), new_booking()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let other = engine.create_booking(&Actor::customer("cust-2"), new_booking()).await.unwrap();

    engine
        .request_transition(&Actor::driver("D1"), &second.id, LifecycleRequest::Advance(BookingStatus::Assigned), None)
        .await
        .unwrap();

    let reconciler = engine.reconciler();
    let pending: Vec<_> = reconciler.pending_bookings().await.unwrap().into_iter().map(|b| b.id).collect();
    assert_eq!(pending, vec![first.id.clone(), other.id.clone()]);

    let history: Vec<_> = reconciler.bookings_for_customer("cust-1").await.unwrap().into_iter().map(|b| b.id).collect();
    assert_eq!(history, vec![second.id.clone(), first.id.clone()]);

    let all: Vec<_> = reconciler.all_bookings().await.unwrap().into_iter().map(|b| b.id).collect();
    assert_eq!(all, vec![other.id, second.id.clone(), first.id]);

    let driven = reconciler.bookings_for_driver("D1").await.unwrap();
    assert_eq!(driven.len(), 1);
    assert_eq!(driven[0].id, second.id);
}

#[tokio::test]
async fn test_only_customers_create_bookings() {
    let (_store, engine) = engine();
    let err = engine.create_booking(&Actor::driver("D1"), new_booking()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotPermitted { role: Role::Driver, .. }));

    let mut blank = new_booking();
    blank.pickup = " ".to_string();
    let err = engine.create_booking(&Actor::customer("cust-1"), blank).await.unwrap_err();
    assert_eq!(err.code(), "validation_failed");
}

#[tokio::test]
async fn test_unknown_references() {
    let (_store, engine) = engine();
    let err = engine.current_state("nope").await.unwrap_err();
    assert_eq!(err.code(), "unknown_booking");
    let err = engine.current_presence("nobody").await.unwrap_err();
    assert_eq!(err.code(), "unknown_driver");
    let err = engine.set_presence("nobody", Availability::Online).await.unwrap_err();
    assert_eq!(err.code(), "unknown_driver");
}
