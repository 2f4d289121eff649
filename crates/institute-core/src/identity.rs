//! Caller identity as forwarded by the upstream identity gateway.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Student,
    Instructor,
    Admin,
}

impl CallerRole {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "instructor" | "trainer" => Some(Self::Instructor),
            "admin" | "administrator" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: CallerRole,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }

    /// Response used by handlers that require an administrator.
    pub fn forbidden(&self) -> Response {
        let payload = json!({
            "error": format!("caller {} is not permitted to perform this action", self.id),
        });
        (StatusCode::FORBIDDEN, Json(payload)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(id) = header_value(parts, CALLER_ID_HEADER) else {
            return Err(unauthorized("missing caller identity"));
        };
        let Some(role) = header_value(parts, CALLER_ROLE_HEADER).and_then(CallerRole::parse) else {
            return Err(unauthorized("missing or unknown caller role"));
        };

        Ok(Caller {
            id: id.to_string(),
            role,
        })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn unauthorized(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
}
