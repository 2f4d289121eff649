//! Runs against a real database when `TEST_DATABASE_URL` is set and is a no-op otherwise.

use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc};
use institute_core::clock::{Clock, FixedClock};
use institute_core::config::DatabaseConfig;
use institute_core::geo::Coordinates;
use institute_core::storage::PgStore;
use institute_core::workflows::catalog::{Location, LocationId, ProgramId, Session, SessionId};
use institute_core::workflows::checkin::{
    CheckInError, CheckInStatus, CheckInSubmission, CheckInVerifier, ReviewConfig,
    ReviewDecision, ReviewRequest, ReviewerId, SessionDirectory, StudentId,
};
use institute_core::workflows::enrollment::{
    AllocationError, AllocatorConfig, BatchAllocator, BatchKey, BatchStatus, PaymentStatus,
    RegistrationId, RegistrationLedger, RegistrationRecord,
};
use serde_json::json;
use tokio::task::JoinSet;

async fn store() -> Option<PgStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url: Some(url),
        max_connections: 4,
    };
    Some(PgStore::connect(&config).await.expect("test database reachable"))
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap(),
    ))
}

/// Keeps rows from earlier runs out of the way.
fn run_tag() -> String {
    format!("{}-{}", std::process::id(), Utc::now().timestamp_micros())
}

fn allocator(store: PgStore) -> Arc<BatchAllocator<PgStore, PgStore>> {
    let store = Arc::new(store);
    Arc::new(BatchAllocator::new(
        store.clone(),
        store,
        clock(),
        AllocatorConfig {
            batch_capacity: 15,
            max_attempts: 64,
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn two_pools_fill_batches_in_one_series() {
    let (Some(first), Some(second)) = (store().await, store().await) else {
        return;
    };
    let tag = run_tag();
    let program = ProgramId(format!("fullstack-{tag}"));
    let location = LocationId(format!("blr-{tag}"));
    let key = BatchKey::new(program.clone(), location.clone());

    for n in 1..=20 {
        first
            .record(RegistrationRecord {
                registration_id: RegistrationId(format!("{tag}-reg-{n}")),
                key: key.clone(),
                payment_status: PaymentStatus::Paid,
            })
            .await
            .expect("ledger write");
    }

    let allocators = [allocator(first), allocator(second)];
    let mut tasks = JoinSet::new();
    for n in 1..=20 {
        let allocator = allocators[n % 2].clone();
        let (program, location) = (program.clone(), location.clone());
        let registration = RegistrationId(format!("{tag}-reg-{n}"));
        tasks.spawn(async move {
            allocator
                .allocate(&program, &location, &registration)
                .await
                .expect("allocation settles")
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("allocation task");
    }

    let batches = allocators[0]
        .batches(&program, &location)
        .await
        .expect("listing");
    let summary: Vec<(u32, u32, BatchStatus)> = batches
        .iter()
        .map(|batch| (batch.number, batch.current_count, batch.status))
        .collect();
    assert_eq!(
        summary,
        vec![(1, 15, BatchStatus::Full), (2, 5, BatchStatus::Open)]
    );
}

#[tokio::test]
async fn paid_registration_cannot_be_moved_to_another_program() {
    let Some(store) = store().await else {
        return;
    };
    let tag = run_tag();
    let registration = RegistrationId(format!("{tag}-reg"));
    let home = BatchKey::new(
        ProgramId(format!("data-{tag}")),
        LocationId(format!("hyd-{tag}")),
    );
    let elsewhere = BatchKey::new(
        ProgramId(format!("ui-{tag}")),
        LocationId(format!("hyd-{tag}")),
    );

    let allocator = allocator(store);
    allocator
        .confirm_payment(&home.program_id, &home.location_id, &registration)
        .await
        .expect("first payment seats the registration");

    match allocator
        .confirm_payment(&elsewhere.program_id, &elsewhere.location_id, &registration)
        .await
    {
        Err(AllocationError::KeyMismatch { registered, .. }) => assert_eq!(registered, home),
        other => panic!("expected key mismatch, got {other:?}"),
    }
    let batches = allocator
        .batches(&elsewhere.program_id, &elsewhere.location_id)
        .await
        .expect("listing");
    assert!(batches.is_empty());
}

#[tokio::test]
async fn active_check_in_slot_and_single_review() {
    let Some(store) = store().await else {
        return;
    };
    let tag = run_tag();
    let clock = clock();
    let center = Coordinates::new(12.9352, 77.6245).expect("valid center");
    let session_id = SessionId(format!("sess-{tag}"));
    store
        .upsert_session(Session {
            id: session_id.clone(),
            location: Location {
                id: LocationId(format!("blr-{tag}")),
                name: "Koramangala Campus".to_string(),
                code: format!("BLR-{tag}"),
                center,
                geofence_radius_meters: 150.0,
                active: true,
            },
            program_id: ProgramId("fullstack-web".to_string()),
            scheduled_on: clock.today(),
            starts_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            ends_at: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            cancelled: false,
            max_attendees: None,
        })
        .await
        .expect("session stored");

    let store = Arc::new(store);
    let verifier = CheckInVerifier::new(store.clone(), store, clock, ReviewConfig::default());
    let submission = |meters: f64| {
        let reading = center.offset_meters(meters, 0.0);
        CheckInSubmission {
            session_id: session_id.clone(),
            student_id: StudentId(format!("stu-{tag}")),
            lat: reading.latitude,
            lng: reading.longitude,
            device_info: json!({ "platform": "android" }),
        }
    };

    let pending = verifier.submit(submission(400.0)).await.expect("stored");
    assert_eq!(pending.status, CheckInStatus::Pending);
    match verifier.submit(submission(20.0)).await {
        Err(CheckInError::DuplicateCheckIn { existing, .. }) => assert_eq!(existing, pending.id),
        other => panic!("expected duplicate, got {other:?}"),
    }

    let reviewer = ReviewerId("admin-1".to_string());
    let reject = ReviewRequest {
        decision: ReviewDecision::Rejected,
        notes: Some("reading taken off campus".to_string()),
    };
    let reviewed = verifier
        .review(pending.id, reviewer.clone(), reject.clone())
        .await
        .expect("review applied");
    assert_eq!(reviewed.status, CheckInStatus::Rejected);
    match verifier.review(pending.id, reviewer, reject).await {
        Err(CheckInError::AlreadyResolved { status, .. }) => {
            assert_eq!(status, CheckInStatus::Rejected)
        }
        other => panic!("expected already resolved, got {other:?}"),
    }

    let retry = verifier.submit(submission(20.0)).await.expect("slot freed");
    assert_eq!(retry.status, CheckInStatus::Verified);
}
