use super::common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::identity::{CALLER_ID_HEADER, CALLER_ROLE_HEADER};
use crate::workflows::checkin::checkin_router;
use crate::workflows::checkin::router::error_response;
use crate::workflows::checkin::CheckInError;

async fn router() -> Router {
    let (verifier, _, _) = build_verifier().await;
    checkin_router(Arc::new(verifier))
}

fn submit_request(student: &str, meters: f64) -> Request<Body> {
    let payload = serde_json::to_vec(&submission("sess-morning", student, meters)).unwrap();
    Request::post("/api/v1/check-ins")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap()
}

fn review_request(id: u64, role: &str, decision: &str) -> Request<Body> {
    let payload = json!({ "decision": decision, "notes": "called the student" });
    let payload = serde_json::to_vec(&payload).unwrap();
    Request::post(format!("/api/v1/check-ins/{id}/review"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(CALLER_ID_HEADER, "admin-7")
        .header(CALLER_ROLE_HEADER, role)
        .body(Body::from(payload))
        .unwrap()
}

#[tokio::test]
async fn submit_returns_created_view() {
    let response = router()
        .await
        .oneshot(submit_request("stu-1", 140.0))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "verified");
    assert_eq!(body["is_within_geofence"], true);
    let distance = body["distance_from_center_meters"].as_f64().expect("distance");
    assert!((distance - 140.0).abs() < 0.01);
    assert!(body.get("device_info").is_none());
    assert!(body.get("reviewer_id").is_none());
}

#[tokio::test]
async fn duplicate_submission_conflicts() {
    let router = router().await;
    let first = router
        .clone()
        .oneshot(submit_request("stu-1", 20.0))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router.oneshot(submit_request("stu-1", 20.0)).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_session_is_unprocessable() {
    let payload = serde_json::to_vec(&submission("sess-missing", "stu-1", 10.0)).unwrap();
    let response = router()
        .await
        .oneshot(
            Request::post("/api/v1/check-ins")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("session does not exist"));
}

#[tokio::test]
async fn review_requires_admin_and_resolves_once() {
    let router = router().await;
    let created = router
        .clone()
        .oneshot(submit_request("stu-1", 300.0))
        .await
        .unwrap();
    let created = read_json_body(created).await;
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_u64().expect("numeric id");

    let forbidden = router
        .clone()
        .oneshot(review_request(id, "student", "verified"))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let reviewed = router
        .clone()
        .oneshot(review_request(id, "admin", "rejected"))
        .await
        .unwrap();
    assert_eq!(reviewed.status(), StatusCode::OK);
    let body = read_json_body(reviewed).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["reviewer_id"], "admin-7");
    assert_eq!(body["notes"], "called the student");

    let again = router
        .clone()
        .oneshot(review_request(id, "admin", "verified"))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let status = router
        .oneshot(
            Request::get(format!("/api/v1/check-ins/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = read_json_body(status).await;
    assert_eq!(body["status"], "rejected");
}

#[tokio::test]
async fn review_without_identity_is_unauthorized() {
    let response = router()
        .await
        .oneshot(
            Request::post("/api/v1/check-ins/1/review")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"decision":"verified"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn review_queue_lists_oldest_first() {
    let router = router().await;
    for student in ["stu-1", "stu-2", "stu-3"] {
        let response = router
            .clone()
            .oneshot(submit_request(student, 280.0))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = router
        .oneshot(
            Request::get("/api/v1/review-queue?limit=5")
                .header(CALLER_ID_HEADER, "admin-7")
                .header(CALLER_ROLE_HEADER, "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["pending"], 3);
    assert_eq!(body["check_ins"][0]["student_id"], "stu-1");
    assert_eq!(body["check_ins"][2]["student_id"], "stu-3");
}

#[tokio::test]
async fn missing_check_in_is_not_found() {
    let response = router()
        .await
        .oneshot(
            Request::get("/api/v1/check-ins/99")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_maps_to_internal_error() {
    let response = error_response(CheckInError::Repository(
        crate::workflows::checkin::RepositoryError::Unavailable("database offline".to_string()),
    ));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn reading_just_past_the_fence_reports_unrounded_distance() {
    let response = router()
        .await
        .oneshot(submit_request("stu-1", RADIUS_METERS + 0.04))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["is_within_geofence"], false);
    let distance = body["distance_from_center_meters"].as_f64().expect("distance");
    assert!(distance > RADIUS_METERS, "{distance} should exceed the radius");
}
