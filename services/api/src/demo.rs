use crate::infra::{parse_date, MemoryServices};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use institute_core::clock::{Clock, FixedClock, SystemClock};
use institute_core::error::AppError;
use institute_core::geo::Coordinates;
use institute_core::workflows::catalog::{Location, LocationId, ProgramId, Session, SessionId};
use institute_core::workflows::checkin::{
    CheckInError, CheckInSubmission, ReviewConfig, ReviewDecision, ReviewRequest, ReviewerId,
    SessionDirectory, StudentId,
};
use institute_core::workflows::enrollment::{
    AllocationError, AllocatorConfig, BatchKey, PaymentStatus, RegistrationId,
    RegistrationLedger, RegistrationRecord,
};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seats per batch.
    #[arg(long, default_value_t = 15)]
    pub(crate) capacity: u32,
    /// Paid registrations arriving at the same moment.
    #[arg(long, default_value_t = 16)]
    pub(crate) registrations: u32,
    /// Geofence radius of the demo campus in meters.
    #[arg(long, default_value_t = 150.0)]
    pub(crate) radius: f64,
    /// Session date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        capacity,
        registrations,
        radius,
        today,
    } = args;

    let clock: Arc<dyn Clock> = match today {
        Some(day) => {
            let morning = day.and_time(NaiveTime::from_hms_opt(9, 45, 0).unwrap_or_default());
            Arc::new(FixedClock(Utc.from_utc_datetime(&morning)))
        }
        None => Arc::new(SystemClock),
    };
    let services = MemoryServices::in_memory(
        AllocatorConfig {
            batch_capacity: capacity,
            // every contender may lose once per seat taken before it
            max_attempts: registrations.saturating_add(4),
        },
        ReviewConfig::default(),
        clock.clone(),
    );

    println!("Institute workflow demo");
    run_allocation(&services, registrations).await?;
    run_check_ins(&services, clock.as_ref(), radius).await?;
    Ok(())
}

async fn run_allocation(services: &MemoryServices, registrations: u32) -> Result<(), AppError> {
    let program = ProgramId("fullstack-web".to_string());
    let location = LocationId("blr-koramangala".to_string());
    let key = BatchKey::new(program.clone(), location.clone());

    for n in 1..=registrations {
        services
            .ledger
            .record(RegistrationRecord {
                registration_id: registration(n),
                key: key.clone(),
                payment_status: PaymentStatus::Paid,
            })
            .await
            .map_err(AllocationError::from)?;
    }

    let preview = services.allocator.preview(&program, &location).await?;
    println!(
        "\nEnrollment: {} paid registrations, next seat estimate batch {} (#{})",
        registrations,
        preview.batch_number,
        preview.current_count + 1
    );

    let mut tasks = JoinSet::new();
    for n in 1..=registrations {
        let allocator = services.allocator.clone();
        let program = program.clone();
        let location = location.clone();
        tasks.spawn(async move {
            allocator
                .allocate(&program, &location, &registration(n))
                .await
                .map(|_| ())
        });
    }
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        if !matches!(joined, Ok(Ok(()))) {
            failed += 1;
        }
    }
    if failed > 0 {
        println!("- {failed} allocations did not settle");
    }

    let batches = services.allocator.batches(&program, &location).await?;
    let total = batches.len();
    for batch in &batches {
        println!(
            "- Batch {} of {}: {}/{} seats | {}",
            batch.number,
            total,
            batch.current_count,
            batch.capacity,
            batch.status.label()
        );
    }
    Ok(())
}

async fn run_check_ins(
    services: &MemoryServices,
    clock: &dyn Clock,
    radius: f64,
) -> Result<(), AppError> {
    let center = Coordinates::new(12.9352, 77.6245).map_err(CheckInError::from)?;
    let session_id = SessionId("sess-demo-morning".to_string());
    services
        .sessions
        .upsert_session(Session {
            id: session_id.clone(),
            location: Location {
                id: LocationId("blr-koramangala".to_string()),
                name: "Koramangala Campus".to_string(),
                code: "BLR1".to_string(),
                center,
                geofence_radius_meters: radius,
                active: true,
            },
            program_id: ProgramId("fullstack-web".to_string()),
            scheduled_on: clock.today(),
            starts_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            ends_at: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            cancelled: false,
            max_attendees: Some(30),
        })
        .await
        .map_err(CheckInError::from)?;

    println!("\nAttendance: campus fence radius {radius:.0} m");
    let readings = [("stu-meera", radius - 10.0), ("stu-arjun", radius * 2.0)];
    let mut pending = Vec::new();
    for (student, meters) in readings {
        let reading = center.offset_meters(meters, 0.0);
        let record = services
            .verifier
            .submit(CheckInSubmission {
                session_id: session_id.clone(),
                student_id: StudentId(student.to_string()),
                lat: reading.latitude,
                lng: reading.longitude,
                device_info: json!({ "platform": "demo" }),
            })
            .await?;
        println!(
            "- {} checked in {:.1} m from center -> {} (within fence: {})",
            student,
            record.distance_from_center_meters,
            record.status.label(),
            record.is_within_geofence
        );
        if !record.status.is_terminal() {
            pending.push(record.id);
        }
    }

    for id in pending {
        let reviewed = services
            .verifier
            .review(
                id,
                ReviewerId("admin-demo".to_string()),
                ReviewRequest {
                    decision: ReviewDecision::Rejected,
                    notes: Some("reading taken off campus".to_string()),
                },
            )
            .await?;
        println!(
            "- Review of check-in {} -> {}",
            reviewed.id,
            reviewed.status.label()
        );

        let second = services
            .verifier
            .review(
                id,
                ReviewerId("admin-demo".to_string()),
                ReviewRequest {
                    decision: ReviewDecision::Verified,
                    notes: None,
                },
            )
            .await;
        match second {
            Ok(_) => println!("  Second review unexpectedly applied"),
            Err(err) => println!("  Second review refused: {err}"),
        }
    }
    Ok(())
}

fn registration(n: u32) -> RegistrationId {
    RegistrationId(format!("reg-{n:03}"))
}
