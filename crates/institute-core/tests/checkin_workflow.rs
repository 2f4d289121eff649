use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{TimeZone, Utc};
use institute_core::clock::{Clock, FixedClock};
use institute_core::geo::Coordinates;
use institute_core::identity::{CALLER_ID_HEADER, CALLER_ROLE_HEADER};
use institute_core::storage::{
    InMemoryCheckInStore, InMemoryRegistrationLedger, InMemorySessionDirectory, SeedData,
};
use institute_core::workflows::checkin::{checkin_router, CheckInVerifier, ReviewConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const SEED: &str = r#"{
    "locations": [
        {
            "id": "pune-baner",
            "name": "Baner Learning Centre",
            "code": "PNQ2",
            "center": { "latitude": 18.559, "longitude": 73.7868 },
            "geofence_radius_meters": 150.0,
            "active": true
        }
    ],
    "sessions": [
        {
            "id": "sess-react-01",
            "location_code": "PNQ2",
            "program_id": "frontend",
            "starts_at": "09:30:00",
            "ends_at": "13:00:00"
        }
    ]
}"#;

fn center() -> Coordinates {
    Coordinates::new(18.559, 73.7868).expect("valid center")
}

async fn app() -> Router {
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 5, 11, 4, 15, 0).unwrap(),
    ));
    let sessions = Arc::new(InMemorySessionDirectory::default());
    let ledger = InMemoryRegistrationLedger::default();
    let summary = SeedData::from_json(SEED)
        .expect("seed parses")
        .load_into(clock.today(), &*sessions, &ledger)
        .await
        .expect("seed loads");
    assert_eq!(summary.sessions, 1);

    let verifier = CheckInVerifier::new(
        sessions,
        Arc::new(InMemoryCheckInStore::default()),
        clock,
        ReviewConfig::default(),
    );
    checkin_router(Arc::new(verifier))
}

fn check_in(student: &str, meters_north: f64) -> Request<Body> {
    let reading = center().offset_meters(meters_north, 0.0);
    let payload = json!({
        "session_id": "sess-react-01",
        "student_id": student,
        "lat": reading.latitude,
        "lng": reading.longitude,
        "device_info": { "platform": "ios", "app_version": "4.2.0" }
    });
    Request::post("/api/v1/check-ins")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json payload")
}

#[tokio::test]
async fn reading_inside_and_outside_the_fence() {
    let app = app().await;

    let inside = app
        .clone()
        .oneshot(check_in("stu-anika", 140.0))
        .await
        .unwrap();
    assert_eq!(inside.status(), StatusCode::CREATED);
    let inside = json_body(inside).await;
    assert_eq!(inside["status"], "verified");
    assert_eq!(inside["is_within_geofence"], true);

    let outside = app
        .clone()
        .oneshot(check_in("stu-rohan", 300.0))
        .await
        .unwrap();
    assert_eq!(outside.status(), StatusCode::CREATED);
    let outside = json_body(outside).await;
    assert_eq!(outside["status"], "pending");
    assert_eq!(outside["is_within_geofence"], false);
    let distance = outside["distance_from_center_meters"]
        .as_f64()
        .expect("distance");
    assert!((distance - 300.0).abs() < 0.5);

    let queue = app
        .clone()
        .oneshot(
            Request::get("/api/v1/review-queue")
                .header(CALLER_ID_HEADER, "ops-lead")
                .header(CALLER_ROLE_HEADER, "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let queue = json_body(queue).await;
    assert_eq!(queue["pending"], 1);
    assert_eq!(queue["check_ins"][0]["student_id"], "stu-rohan");

    let id = outside["id"].as_u64().expect("id");
    let review = app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/check-ins/{id}/review"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(CALLER_ID_HEADER, "ops-lead")
                .header(CALLER_ROLE_HEADER, "admin")
                .body(Body::from(r#"{"decision":"rejected","notes":"outside campus"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(review.status(), StatusCode::OK);
    assert_eq!(json_body(review).await["status"], "rejected");

    let retry = app.oneshot(check_in("stu-rohan", 40.0)).await.unwrap();
    assert_eq!(retry.status(), StatusCode::CREATED);
    assert_eq!(json_body(retry).await["status"], "verified");
}

#[tokio::test]
async fn malformed_coordinates_are_rejected() {
    let response = app()
        .await
        .oneshot(
            Request::post("/api/v1/check-ins")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"session_id":"sess-react-01","student_id":"stu-1","lat":18.5,"lng":181.0}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
