use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::workflows::catalog::{Session, SessionId};
use crate::workflows::checkin::{
    self, CheckInId, CheckInRecord, CheckInRepository, CheckInStatus, NewCheckIn, Resolution,
    SessionDirectory, StudentId,
};
use crate::workflows::enrollment::{
    self, BatchAssignment, BatchId, BatchKey, BatchRecord, BatchRepository, BatchStatus,
    BatchUpdate, NewBatch, PaymentStatus, RegistrationId, RegistrationLedger, RegistrationRecord,
    SeatClaim,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, table: &str) -> Result<MutexGuard<'a, T>, String> {
    mutex.lock().map_err(|_| format!("{table} lock poisoned"))
}

#[derive(Default)]
struct BatchTables {
    batches: BTreeMap<BatchId, BatchRecord>,
    series: HashMap<BatchKey, Vec<BatchId>>,
    assignments: HashMap<RegistrationId, BatchAssignment>,
    last_id: u64,
}

/// Batch table with a unique (program, location, number) index and conditional seat claims.
#[derive(Default, Clone)]
pub struct InMemoryBatchStore {
    tables: Arc<Mutex<BatchTables>>,
}

impl InMemoryBatchStore {
    fn tables(&self) -> Result<MutexGuard<'_, BatchTables>, enrollment::RepositoryError> {
        lock(&self.tables, "batch").map_err(enrollment::RepositoryError::Unavailable)
    }

    /// Number of registration links held by the store.
    pub fn assignment_count(&self) -> Result<usize, enrollment::RepositoryError> {
        Ok(self.tables()?.assignments.len())
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchStore {
    async fn batches(
        &self,
        key: &BatchKey,
    ) -> Result<Vec<BatchRecord>, enrollment::RepositoryError> {
        let tables = self.tables()?;
        let ids = tables.series.get(key).map(Vec::as_slice).unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| tables.batches.get(id).cloned())
            .collect())
    }

    async fn batch(
        &self,
        id: BatchId,
    ) -> Result<Option<BatchRecord>, enrollment::RepositoryError> {
        Ok(self.tables()?.batches.get(&id).cloned())
    }

    async fn create_batch(
        &self,
        batch: NewBatch,
    ) -> Result<BatchRecord, enrollment::RepositoryError> {
        let mut tables = self.tables()?;
        let highest = tables
            .series
            .get(&batch.key)
            .and_then(|ids| ids.last())
            .and_then(|id| tables.batches.get(id))
            .map_or(0, |record| record.number);
        if batch.number != highest + 1 {
            return Err(enrollment::RepositoryError::Conflict);
        }

        tables.last_id += 1;
        let record = BatchRecord {
            id: BatchId(tables.last_id),
            program_id: batch.key.program_id.clone(),
            location_id: batch.key.location_id.clone(),
            number: batch.number,
            capacity: batch.capacity,
            current_count: 0,
            status: BatchStatus::Open,
            start_date: None,
            created_at: batch.created_at,
        };
        tables.batches.insert(record.id, record.clone());
        tables.series.entry(batch.key).or_default().push(record.id);
        Ok(record)
    }

    async fn claim_seat(
        &self,
        claim: SeatClaim,
    ) -> Result<BatchAssignment, enrollment::RepositoryError> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.assignments.get(&claim.registration_id) {
            return Err(enrollment::RepositoryError::AlreadyAllocated(Box::new(
                existing.clone(),
            )));
        }

        let batch = tables
            .batches
            .get_mut(&claim.batch_id)
            .ok_or(enrollment::RepositoryError::NotFound)?;
        if batch.current_count >= batch.capacity {
            return Err(enrollment::RepositoryError::CapacityExceeded);
        }
        if batch.status != BatchStatus::Open || batch.current_count != claim.expected_count {
            return Err(enrollment::RepositoryError::Conflict);
        }

        batch.current_count += 1;
        if batch.current_count == batch.capacity {
            batch.status = BatchStatus::Full;
        }

        let assignment = BatchAssignment {
            registration_id: claim.registration_id.clone(),
            batch_id: batch.id,
            program_id: batch.program_id.clone(),
            location_id: batch.location_id.clone(),
            batch_number: batch.number,
            seat_number: batch.current_count,
            assigned_at: claim.claimed_at,
        };
        tables
            .assignments
            .insert(claim.registration_id, assignment.clone());
        Ok(assignment)
    }

    async fn assignment(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<BatchAssignment>, enrollment::RepositoryError> {
        Ok(self.tables()?.assignments.get(registration_id).cloned())
    }

    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<BatchRecord, enrollment::RepositoryError> {
        let mut tables = self.tables()?;
        let batch = tables
            .batches
            .get_mut(&id)
            .ok_or(enrollment::RepositoryError::NotFound)?;
        batch.apply_update(update)?;
        Ok(batch.clone())
    }
}

type RegistrationTable = HashMap<RegistrationId, RegistrationRecord>;

/// Stand-in for the registration collaborator's payment records.
#[derive(Default, Clone)]
pub struct InMemoryRegistrationLedger {
    entries: Arc<Mutex<RegistrationTable>>,
}

impl InMemoryRegistrationLedger {
    fn entries(&self) -> Result<MutexGuard<'_, RegistrationTable>, enrollment::RepositoryError> {
        lock(&self.entries, "registration").map_err(enrollment::RepositoryError::Unavailable)
    }
}

#[async_trait]
impl RegistrationLedger for InMemoryRegistrationLedger {
    async fn registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<RegistrationRecord>, enrollment::RepositoryError> {
        Ok(self.entries()?.get(registration_id).cloned())
    }

    async fn paid_count(&self, key: &BatchKey) -> Result<u32, enrollment::RepositoryError> {
        let paid = self
            .entries()?
            .values()
            .filter(|entry| entry.key == *key && entry.payment_status == PaymentStatus::Paid)
            .count();
        Ok(u32::try_from(paid).unwrap_or(u32::MAX))
    }

    async fn record(
        &self,
        registration: RegistrationRecord,
    ) -> Result<(), enrollment::RepositoryError> {
        let mut entries = self.entries()?;
        if let Some(existing) = entries.get(&registration.registration_id) {
            let moves = existing.key != registration.key
                || registration.payment_status != PaymentStatus::Paid;
            if existing.payment_status == PaymentStatus::Paid && moves {
                return Err(enrollment::RepositoryError::AlreadyPaid {
                    key: existing.key.clone(),
                });
            }
        }
        entries.insert(registration.registration_id.clone(), registration);
        Ok(())
    }
}

#[derive(Default)]
struct CheckInTables {
    records: BTreeMap<CheckInId, CheckInRecord>,
    // partial unique index over rows that are not rejected
    active: HashMap<(SessionId, StudentId), CheckInId>,
    last_id: u64,
}

/// Check-in table with a partial unique index on (session, student) and pending-only updates.
#[derive(Default, Clone)]
pub struct InMemoryCheckInStore {
    tables: Arc<Mutex<CheckInTables>>,
}

impl InMemoryCheckInStore {
    fn tables(&self) -> Result<MutexGuard<'_, CheckInTables>, checkin::RepositoryError> {
        lock(&self.tables, "check-in").map_err(checkin::RepositoryError::Unavailable)
    }
}

#[async_trait]
impl CheckInRepository for InMemoryCheckInStore {
    async fn insert(
        &self,
        check_in: NewCheckIn,
    ) -> Result<CheckInRecord, checkin::RepositoryError> {
        let mut tables = self.tables()?;
        let slot = (check_in.session_id.clone(), check_in.student_id.clone());
        if let Some(existing) = tables.active.get(&slot) {
            return Err(checkin::RepositoryError::Conflict {
                existing: *existing,
            });
        }

        tables.last_id += 1;
        let record = CheckInRecord::from_new(CheckInId(tables.last_id), check_in);
        if record.status.holds_slot() {
            tables.active.insert(slot, record.id);
        }
        tables.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn fetch(
        &self,
        id: CheckInId,
    ) -> Result<Option<CheckInRecord>, checkin::RepositoryError> {
        Ok(self.tables()?.records.get(&id).cloned())
    }

    async fn resolve(
        &self,
        id: CheckInId,
        resolution: Resolution,
    ) -> Result<CheckInRecord, checkin::RepositoryError> {
        let mut tables = self.tables()?;
        let record = tables
            .records
            .get_mut(&id)
            .ok_or(checkin::RepositoryError::NotFound)?;
        if record.status != CheckInStatus::Pending {
            return Err(checkin::RepositoryError::AlreadyResolved(record.status));
        }

        record.apply(resolution);
        let resolved = record.clone();
        if !resolved.status.holds_slot() {
            tables
                .active
                .remove(&(resolved.session_id.clone(), resolved.student_id.clone()));
        }
        Ok(resolved)
    }

    async fn pending(
        &self,
        limit: usize,
    ) -> Result<Vec<CheckInRecord>, checkin::RepositoryError> {
        let tables = self.tables()?;
        let mut pending: Vec<CheckInRecord> = tables
            .records
            .values()
            .filter(|record| record.status == CheckInStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }
}

/// Stand-in for the scheduling collaborator.
#[derive(Default, Clone)]
pub struct InMemorySessionDirectory {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl InMemorySessionDirectory {
    fn sessions(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<SessionId, Session>>, checkin::RepositoryError> {
        lock(&self.sessions, "session").map_err(checkin::RepositoryError::Unavailable)
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn session(
        &self,
        id: &SessionId,
    ) -> Result<Option<Session>, checkin::RepositoryError> {
        Ok(self.sessions()?.get(id).cloned())
    }

    async fn upsert_session(&self, session: Session) -> Result<(), checkin::RepositoryError> {
        self.sessions()?.insert(session.id.clone(), session);
        Ok(())
    }
}
