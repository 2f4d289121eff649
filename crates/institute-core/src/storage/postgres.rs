//! Postgres backing for every repository trait.
//!
//! Correctness does not rely on the process: batch numbers are unique per (program, location),
//! seat counts are bounded by a check constraint, seats are claimed by a conditional update
//! inside a transaction, and the active check-in slot is a partial unique index. Several
//! service instances can share one database.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow, Postgres};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::geo::Coordinates;
use crate::workflows::catalog::{Location, LocationId, ProgramId, Session, SessionId};
use crate::workflows::checkin::{
    self, CheckInId, CheckInRecord, CheckInRepository, CheckInStatus, NewCheckIn, Resolution,
    ReviewerId, SessionDirectory, StudentId,
};
use crate::workflows::enrollment::{
    self, BatchAssignment, BatchId, BatchKey, BatchRecord, BatchRepository, BatchStatus,
    BatchUpdate, NewBatch, PaymentStatus, RegistrationId, RegistrationLedger, RegistrationRecord,
    SeatClaim,
};

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("DATABASE_URL is not set")]
    MissingUrl,
    #[error("unable to connect to postgres: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("unable to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool shared by all repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PostgresError> {
        let url = config.url.as_deref().ok_or(PostgresError::MissingUrl)?;
        info!(max_connections = config.max_connections, "connecting to postgres");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(PostgresError::Connect)?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database schema is current");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| db.is_unique_violation())
}

fn batch_error(err: sqlx::Error) -> enrollment::RepositoryError {
    enrollment::RepositoryError::Unavailable(err.to_string())
}

fn check_in_error(err: sqlx::Error) -> checkin::RepositoryError {
    checkin::RepositoryError::Unavailable(err.to_string())
}

/// Integer conversion between domain counters and SQL columns.
fn convert<T, U>(value: T, column: &str) -> Result<U, String>
where
    T: Copy + fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| format!("{column} value {value} is out of range"))
}

fn label<T>(parsed: Option<T>, column: &str, raw: &str) -> Result<T, String> {
    parsed.ok_or_else(|| format!("{column} holds unknown value '{raw}'"))
}

#[derive(Debug, Clone, FromRow)]
struct BatchRow {
    id: i64,
    program_id: String,
    location_id: String,
    number: i32,
    capacity: i32,
    current_count: i32,
    status: String,
    start_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for BatchRecord {
    type Error = String;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: BatchId(convert(row.id, "batches.id")?),
            status: label(
                BatchStatus::from_label(&row.status),
                "batches.status",
                &row.status,
            )?,
            program_id: ProgramId(row.program_id),
            location_id: LocationId(row.location_id),
            number: convert(row.number, "batches.number")?,
            capacity: convert(row.capacity, "batches.capacity")?,
            current_count: convert(row.current_count, "batches.current_count")?,
            start_date: row.start_date,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct AssignmentRow {
    registration_id: String,
    batch_id: i64,
    program_id: String,
    location_id: String,
    batch_number: i32,
    seat_number: i32,
    assigned_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for BatchAssignment {
    type Error = String;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            registration_id: RegistrationId(row.registration_id),
            batch_id: BatchId(convert(row.batch_id, "batch_assignments.batch_id")?),
            program_id: ProgramId(row.program_id),
            location_id: LocationId(row.location_id),
            batch_number: convert(row.batch_number, "batches.number")?,
            seat_number: convert(row.seat_number, "batch_assignments.seat_number")?,
            assigned_at: row.assigned_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct RegistrationRow {
    id: String,
    program_id: String,
    location_id: String,
    payment_status: String,
}

impl TryFrom<RegistrationRow> for RegistrationRecord {
    type Error = String;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let payment_status = label(
            PaymentStatus::from_label(&row.payment_status),
            "registrations.payment_status",
            &row.payment_status,
        )?;
        Ok(Self {
            registration_id: RegistrationId(row.id),
            key: BatchKey::new(ProgramId(row.program_id), LocationId(row.location_id)),
            payment_status,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: String,
    program_id: String,
    scheduled_on: NaiveDate,
    starts_at: NaiveTime,
    ends_at: NaiveTime,
    cancelled: bool,
    max_attendees: Option<i32>,
    location_id: String,
    location_name: String,
    location_code: String,
    latitude: f64,
    longitude: f64,
    geofence_radius_meters: f64,
    location_active: bool,
}

impl TryFrom<SessionRow> for Session {
    type Error = String;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let center = Coordinates::new(row.latitude, row.longitude)
            .map_err(|err| format!("location {} center: {err}", row.location_id))?;
        let max_attendees = row
            .max_attendees
            .map(|max| convert(max, "sessions.max_attendees"))
            .transpose()?;
        Ok(Self {
            id: SessionId(row.id),
            location: Location {
                id: LocationId(row.location_id),
                name: row.location_name,
                code: row.location_code,
                center,
                geofence_radius_meters: row.geofence_radius_meters,
                active: row.location_active,
            },
            program_id: ProgramId(row.program_id),
            scheduled_on: row.scheduled_on,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            cancelled: row.cancelled,
            max_attendees,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct CheckInRow {
    id: i64,
    session_id: String,
    student_id: String,
    location_id: String,
    latitude: f64,
    longitude: f64,
    distance_from_center_meters: f64,
    is_within_geofence: bool,
    status: String,
    reviewer_id: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    notes: String,
    device_info: serde_json::Value,
    submitted_at: DateTime<Utc>,
}

impl TryFrom<CheckInRow> for CheckInRecord {
    type Error = String;

    fn try_from(row: CheckInRow) -> Result<Self, Self::Error> {
        let coordinates = Coordinates::new(row.latitude, row.longitude)
            .map_err(|err| format!("check-in {} coordinates: {err}", row.id))?;
        Ok(Self {
            id: CheckInId(convert(row.id, "check_ins.id")?),
            status: label(
                CheckInStatus::from_label(&row.status),
                "check_ins.status",
                &row.status,
            )?,
            session_id: SessionId(row.session_id),
            student_id: StudentId(row.student_id),
            location_id: LocationId(row.location_id),
            coordinates,
            distance_from_center_meters: row.distance_from_center_meters,
            is_within_geofence: row.is_within_geofence,
            reviewer_id: row.reviewer_id.map(ReviewerId),
            verified_at: row.verified_at,
            notes: row.notes,
            device_info: row.device_info,
            submitted_at: row.submitted_at,
        })
    }
}

fn batch_record(row: BatchRow) -> Result<BatchRecord, enrollment::RepositoryError> {
    BatchRecord::try_from(row).map_err(enrollment::RepositoryError::Unavailable)
}

fn check_in_record(row: CheckInRow) -> Result<CheckInRecord, checkin::RepositoryError> {
    CheckInRecord::try_from(row).map_err(checkin::RepositoryError::Unavailable)
}

async fn find_assignment<'e, E>(
    executor: E,
    registration_id: &RegistrationId,
) -> Result<Option<BatchAssignment>, enrollment::RepositoryError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<AssignmentRow> = sqlx::query_as(
        "SELECT a.registration_id, a.batch_id, b.program_id, b.location_id, \
                b.number AS batch_number, a.seat_number, a.assigned_at \
         FROM batch_assignments a \
         JOIN batches b ON b.id = a.batch_id \
         WHERE a.registration_id = $1",
    )
    .bind(registration_id.0.clone())
    .fetch_optional(executor)
    .await
    .map_err(batch_error)?;

    row.map(BatchAssignment::try_from)
        .transpose()
        .map_err(enrollment::RepositoryError::Unavailable)
}

#[async_trait]
impl BatchRepository for PgStore {
    async fn batches(
        &self,
        key: &BatchKey,
    ) -> Result<Vec<BatchRecord>, enrollment::RepositoryError> {
        let rows: Vec<BatchRow> = sqlx::query_as(
            "SELECT * FROM batches WHERE program_id = $1 AND location_id = $2 ORDER BY number",
        )
        .bind(&key.program_id.0)
        .bind(&key.location_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(batch_error)?;

        rows.into_iter().map(batch_record).collect()
    }

    async fn batch(
        &self,
        id: BatchId,
    ) -> Result<Option<BatchRecord>, enrollment::RepositoryError> {
        let id: i64 =
            convert(id.0, "batches.id").map_err(enrollment::RepositoryError::Unavailable)?;
        let row: Option<BatchRow> = sqlx::query_as("SELECT * FROM batches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(batch_error)?;

        row.map(batch_record).transpose()
    }

    async fn create_batch(
        &self,
        batch: NewBatch,
    ) -> Result<BatchRecord, enrollment::RepositoryError> {
        let number: i32 = convert(batch.number, "batches.number")
            .map_err(enrollment::RepositoryError::Unavailable)?;
        let capacity: i32 = convert(batch.capacity, "batches.capacity")
            .map_err(enrollment::RepositoryError::Unavailable)?;

        // inserts nothing unless `number` directly follows the highest existing batch
        let inserted = sqlx::query_as::<_, BatchRow>(
            "INSERT INTO batches (program_id, location_id, number, capacity, current_count, \
                                  status, created_at) \
             SELECT $1, $2, $3, $4, 0, 'open', $5 \
             WHERE $3 = (SELECT COALESCE(MAX(number), 0) + 1 FROM batches \
                         WHERE program_id = $1 AND location_id = $2) \
             RETURNING *",
        )
        .bind(&batch.key.program_id.0)
        .bind(&batch.key.location_id.0)
        .bind(number)
        .bind(capacity)
        .bind(batch.created_at)
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(row)) => batch_record(row),
            Ok(None) => Err(enrollment::RepositoryError::Conflict),
            Err(err) if is_unique_violation(&err) => {
                debug!(key = %batch.key, number = batch.number, "batch number already taken");
                Err(enrollment::RepositoryError::Conflict)
            }
            Err(err) => Err(batch_error(err)),
        }
    }

    async fn claim_seat(
        &self,
        claim: SeatClaim,
    ) -> Result<BatchAssignment, enrollment::RepositoryError> {
        let batch_id: i64 = convert(claim.batch_id.0, "batches.id")
            .map_err(enrollment::RepositoryError::Unavailable)?;
        let expected: i32 = convert(claim.expected_count, "batches.current_count")
            .map_err(enrollment::RepositoryError::Unavailable)?;

        let mut tx = self.pool.begin().await.map_err(batch_error)?;

        if let Some(existing) = find_assignment(&mut *tx, &claim.registration_id).await? {
            return Err(enrollment::RepositoryError::AlreadyAllocated(Box::new(
                existing,
            )));
        }

        let claimed: Option<BatchRow> = sqlx::query_as(
            "UPDATE batches \
             SET current_count = current_count + 1, \
                 status = CASE WHEN current_count + 1 = capacity THEN 'full' ELSE status END \
             WHERE id = $1 AND status = 'open' AND current_count = $2 \
               AND current_count < capacity \
             RETURNING *",
        )
        .bind(batch_id)
        .bind(expected)
        .fetch_optional(&mut *tx)
        .await
        .map_err(batch_error)?;

        let Some(row) = claimed else {
            let current: Option<BatchRow> =
                sqlx::query_as("SELECT * FROM batches WHERE id = $1")
                    .bind(batch_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(batch_error)?;
            return Err(match current {
                None => enrollment::RepositoryError::NotFound,
                Some(batch) if batch.current_count >= batch.capacity => {
                    enrollment::RepositoryError::CapacityExceeded
                }
                Some(_) => enrollment::RepositoryError::Conflict,
            });
        };
        let batch = batch_record(row)?;
        let seat: i32 = convert(batch.current_count, "batch_assignments.seat_number")
            .map_err(enrollment::RepositoryError::Unavailable)?;

        let linked = sqlx::query(
            "INSERT INTO batch_assignments (registration_id, batch_id, seat_number, assigned_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&claim.registration_id.0)
        .bind(batch_id)
        .bind(seat)
        .bind(claim.claimed_at)
        .execute(&mut *tx)
        .await;

        match linked {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                // a concurrent claim for the same registration committed first
                tx.rollback().await.map_err(batch_error)?;
                return match find_assignment(&self.pool, &claim.registration_id).await? {
                    Some(existing) => Err(enrollment::RepositoryError::AlreadyAllocated(
                        Box::new(existing),
                    )),
                    None => Err(enrollment::RepositoryError::Conflict),
                };
            }
            Err(err) => return Err(batch_error(err)),
        }
        tx.commit().await.map_err(batch_error)?;

        Ok(BatchAssignment {
            registration_id: claim.registration_id,
            batch_id: batch.id,
            program_id: batch.program_id,
            location_id: batch.location_id,
            batch_number: batch.number,
            seat_number: batch.current_count,
            assigned_at: claim.claimed_at,
        })
    }

    async fn assignment(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, enrollment::RepositoryError> {
        find_assignment(&self.pool, registration_id).await
    }

    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<BatchRecord, enrollment::RepositoryError> {
        let batch_id: i64 =
            convert(id.0, "batches.id").map_err(enrollment::RepositoryError::Unavailable)?;
        let mut tx = self.pool.begin().await.map_err(batch_error)?;

        let row: Option<BatchRow> =
            sqlx::query_as("SELECT * FROM batches WHERE id = $1 FOR UPDATE")
                .bind(batch_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(batch_error)?;
        let mut batch = batch_record(row.ok_or(enrollment::RepositoryError::NotFound)?)?;
        batch.apply_update(update)?;

        sqlx::query("UPDATE batches SET status = $2, start_date = $3 WHERE id = $1")
            .bind(batch_id)
            .bind(batch.status.label())
            .bind(batch.start_date)
            .execute(&mut *tx)
            .await
            .map_err(batch_error)?;
        tx.commit().await.map_err(batch_error)?;

        Ok(batch)
    }
}

#[async_trait]
impl RegistrationLedger for PgStore {
    async fn registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<RegistrationRecord>, enrollment::RepositoryError> {
        let row: Option<RegistrationRow> = sqlx::query_as(
            "SELECT id, program_id, location_id, payment_status FROM registrations WHERE id = $1",
        )
        .bind(&registration_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(batch_error)?;

        row.map(RegistrationRecord::try_from)
            .transpose()
            .map_err(enrollment::RepositoryError::Unavailable)
    }

    async fn paid_count(&self, key: &BatchKey) -> Result<u32, enrollment::RepositoryError> {
        let paid: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations \
             WHERE program_id = $1 AND location_id = $2 AND payment_status = 'paid'",
        )
        .bind(&key.program_id.0)
        .bind(&key.location_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(batch_error)?;

        Ok(u32::try_from(paid).unwrap_or(u32::MAX))
    }

    async fn record(
        &self,
        registration: RegistrationRecord,
    ) -> Result<(), enrollment::RepositoryError> {
        // the upsert skips paid rows unless it repeats the same paid key
        let written: Option<String> = sqlx::query_scalar(
            "INSERT INTO registrations (id, program_id, location_id, payment_status) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE \
             SET program_id = EXCLUDED.program_id, \
                 location_id = EXCLUDED.location_id, \
                 payment_status = EXCLUDED.payment_status, \
                 updated_at = now() \
             WHERE registrations.payment_status <> 'paid' \
                OR (registrations.program_id = EXCLUDED.program_id \
                    AND registrations.location_id = EXCLUDED.location_id \
                    AND EXCLUDED.payment_status = 'paid') \
             RETURNING id",
        )
        .bind(&registration.registration_id.0)
        .bind(&registration.key.program_id.0)
        .bind(&registration.key.location_id.0)
        .bind(registration.payment_status.label())
        .fetch_optional(&self.pool)
        .await
        .map_err(batch_error)?;

        if written.is_some() {
            return Ok(());
        }
        match self.registration(&registration.registration_id).await? {
            Some(existing) => Err(enrollment::RepositoryError::AlreadyPaid {
                key: existing.key,
            }),
            None => Err(enrollment::RepositoryError::Conflict),
        }
    }
}

#[async_trait]
impl SessionDirectory for PgStore {
    async fn session(
        &self,
        id: &SessionId,
    ) -> Result<Option<Session>, checkin::RepositoryError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT s.id, s.program_id, s.scheduled_on, s.starts_at, s.ends_at, s.cancelled, \
                    s.max_attendees, l.id AS location_id, l.name AS location_name, \
                    l.code AS location_code, l.latitude, l.longitude, \
                    l.geofence_radius_meters, l.active AS location_active \
             FROM sessions s \
             JOIN locations l ON l.id = s.location_id \
             WHERE s.id = $1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(check_in_error)?;

        row.map(Session::try_from)
            .transpose()
            .map_err(checkin::RepositoryError::Unavailable)
    }

    async fn upsert_session(&self, session: Session) -> Result<(), checkin::RepositoryError> {
        let max_attendees: Option<i32> = session
            .max_attendees
            .map(|max| convert(max, "sessions.max_attendees"))
            .transpose()
            .map_err(checkin::RepositoryError::Unavailable)?;
        let location = &session.location;
        let mut tx = self.pool.begin().await.map_err(check_in_error)?;

        sqlx::query(
            "INSERT INTO locations (id, name, code, latitude, longitude, \
                                    geofence_radius_meters, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE \
             SET name = EXCLUDED.name, code = EXCLUDED.code, latitude = EXCLUDED.latitude, \
                 longitude = EXCLUDED.longitude, \
                 geofence_radius_meters = EXCLUDED.geofence_radius_meters, \
                 active = EXCLUDED.active",
        )
        .bind(&location.id.0)
        .bind(&location.name)
        .bind(&location.code)
        .bind(location.center.latitude)
        .bind(location.center.longitude)
        .bind(location.geofence_radius_meters)
        .bind(location.active)
        .execute(&mut *tx)
        .await
        .map_err(check_in_error)?;

        sqlx::query(
            "INSERT INTO sessions (id, location_id, program_id, scheduled_on, starts_at, \
                                   ends_at, cancelled, max_attendees) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE \
             SET location_id = EXCLUDED.location_id, program_id = EXCLUDED.program_id, \
                 scheduled_on = EXCLUDED.scheduled_on, starts_at = EXCLUDED.starts_at, \
                 ends_at = EXCLUDED.ends_at, cancelled = EXCLUDED.cancelled, \
                 max_attendees = EXCLUDED.max_attendees",
        )
        .bind(&session.id.0)
        .bind(&location.id.0)
        .bind(&session.program_id.0)
        .bind(session.scheduled_on)
        .bind(session.starts_at)
        .bind(session.ends_at)
        .bind(session.cancelled)
        .bind(max_attendees)
        .execute(&mut *tx)
        .await
        .map_err(check_in_error)?;

        tx.commit().await.map_err(check_in_error)
    }
}

#[async_trait]
impl CheckInRepository for PgStore {
    async fn insert(
        &self,
        check_in: NewCheckIn,
    ) -> Result<CheckInRecord, checkin::RepositoryError> {
        let inserted = sqlx::query_as::<_, CheckInRow>(
            "INSERT INTO check_ins (session_id, student_id, location_id, latitude, longitude, \
                                    distance_from_center_meters, is_within_geofence, status, \
                                    verified_at, device_info, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING *",
        )
        .bind(&check_in.session_id.0)
        .bind(&check_in.student_id.0)
        .bind(&check_in.location_id.0)
        .bind(check_in.coordinates.latitude)
        .bind(check_in.coordinates.longitude)
        .bind(check_in.distance_from_center_meters)
        .bind(check_in.is_within_geofence)
        .bind(check_in.status.label())
        .bind(check_in.verified_at)
        .bind(&check_in.device_info)
        .bind(check_in.submitted_at)
        .fetch_one(&self.pool)
        .await;

        let err = match inserted {
            Ok(row) => return check_in_record(row),
            Err(err) => err,
        };
        if !is_unique_violation(&err) {
            return Err(check_in_error(err));
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM check_ins \
             WHERE session_id = $1 AND student_id = $2 AND status <> 'rejected'",
        )
        .bind(&check_in.session_id.0)
        .bind(&check_in.student_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(check_in_error)?;

        match existing {
            Some(id) => Err(checkin::RepositoryError::Conflict {
                existing: CheckInId(
                    convert(id, "check_ins.id").map_err(checkin::RepositoryError::Unavailable)?,
                ),
            }),
            None => Err(checkin::RepositoryError::Unavailable(
                "active check-in changed while inserting, retry".to_string(),
            )),
        }
    }

    async fn fetch(
        &self,
        id: CheckInId,
    ) -> Result<Option<CheckInRecord>, checkin::RepositoryError> {
        let id: i64 =
            convert(id.0, "check_ins.id").map_err(checkin::RepositoryError::Unavailable)?;
        let row: Option<CheckInRow> = sqlx::query_as("SELECT * FROM check_ins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(check_in_error)?;

        row.map(check_in_record).transpose()
    }

    async fn resolve(
        &self,
        id: CheckInId,
        resolution: Resolution,
    ) -> Result<CheckInRecord, checkin::RepositoryError> {
        let check_in_id: i64 =
            convert(id.0, "check_ins.id").map_err(checkin::RepositoryError::Unavailable)?;
        let status = CheckInStatus::from(resolution.decision);

        let resolved: Option<CheckInRow> = sqlx::query_as(
            "UPDATE check_ins \
             SET status = $2, reviewer_id = $3, verified_at = $4, notes = COALESCE($5, notes) \
             WHERE id = $1 AND status = 'pending' \
             RETURNING *",
        )
        .bind(check_in_id)
        .bind(status.label())
        .bind(&resolution.reviewer_id.0)
        .bind(resolution.reviewed_at)
        .bind(&resolution.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(check_in_error)?;

        if let Some(row) = resolved {
            return check_in_record(row);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM check_ins WHERE id = $1")
                .bind(check_in_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(check_in_error)?;
        match current {
            None => Err(checkin::RepositoryError::NotFound),
            Some(raw) => {
                let status = label(CheckInStatus::from_label(&raw), "check_ins.status", &raw)
                    .map_err(checkin::RepositoryError::Unavailable)?;
                Err(checkin::RepositoryError::AlreadyResolved(status))
            }
        }
    }

    async fn pending(
        &self,
        limit: usize,
    ) -> Result<Vec<CheckInRecord>, checkin::RepositoryError> {
        let rows: Vec<CheckInRow> = sqlx::query_as(
            "SELECT * FROM check_ins WHERE status = 'pending' \
             ORDER BY submitted_at, id LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(check_in_error)?;

        rows.into_iter().map(check_in_record).collect()
    }
}
