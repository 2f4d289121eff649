use chrono::NaiveDate;
use institute_core::clock::Clock;
use institute_core::error::AppError;
use institute_core::storage::{
    InMemoryBatchStore, InMemoryCheckInStore, InMemoryRegistrationLedger,
    InMemorySessionDirectory, PgStore, SeedData, SeedSummary,
};
use institute_core::workflows::checkin::{
    CheckInRepository, CheckInVerifier, ReviewConfig, SessionDirectory,
};
use institute_core::workflows::enrollment::{
    AllocatorConfig, BatchAllocator, BatchRepository, RegistrationLedger,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stores and the workflow services wired against them.
pub(crate) struct Services<B, L, S, C> {
    pub(crate) allocator: Arc<BatchAllocator<B, L>>,
    pub(crate) verifier: Arc<CheckInVerifier<S, C>>,
    pub(crate) ledger: Arc<L>,
    pub(crate) sessions: Arc<S>,
    pub(crate) batches: Arc<B>,
}

pub(crate) type MemoryServices = Services<
    InMemoryBatchStore,
    InMemoryRegistrationLedger,
    InMemorySessionDirectory,
    InMemoryCheckInStore,
>;

pub(crate) type PgServices = Services<PgStore, PgStore, PgStore, PgStore>;

impl MemoryServices {
    pub(crate) fn in_memory(
        allocator: AllocatorConfig,
        review: ReviewConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryBatchStore::default()),
            Arc::new(InMemoryRegistrationLedger::default()),
            Arc::new(InMemorySessionDirectory::default()),
            Arc::new(InMemoryCheckInStore::default()),
            allocator,
            review,
            clock,
        )
    }
}

impl PgServices {
    /// Every repository shares the one connection pool.
    pub(crate) fn postgres(
        store: PgStore,
        allocator: AllocatorConfig,
        review: ReviewConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(store);
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            allocator,
            review,
            clock,
        )
    }
}

impl<B, L, S, C> Services<B, L, S, C>
where
    B: BatchRepository + 'static,
    L: RegistrationLedger + 'static,
    S: SessionDirectory + 'static,
    C: CheckInRepository + 'static,
{
    pub(crate) fn new(
        batches: Arc<B>,
        ledger: Arc<L>,
        sessions: Arc<S>,
        check_ins: Arc<C>,
        allocator: AllocatorConfig,
        review: ReviewConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            allocator: Arc::new(BatchAllocator::new(
                batches.clone(),
                ledger.clone(),
                clock.clone(),
                allocator,
            )),
            verifier: Arc::new(CheckInVerifier::new(
                sessions.clone(),
                check_ins,
                clock,
                review,
            )),
            ledger,
            sessions,
            batches,
        }
    }

    /// Load a seed into the collaborator stand-ins and seat every registration it marks paid.
    pub(crate) async fn load_seed(
        &self,
        seed: SeedData,
        today: NaiveDate,
    ) -> Result<SeedSummary, AppError> {
        let summary = seed
            .load_into(today, &*self.sessions, &*self.ledger)
            .await?;
        for (registration_id, key) in &summary.paid {
            self.allocator
                .allocate(&key.program_id, &key.location_id, registration_id)
                .await?;
        }

        info!(
            locations = summary.locations,
            sessions = summary.sessions,
            registrations = summary.registrations,
            allocated = summary.paid.len(),
            "seed data loaded"
        );
        Ok(summary)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
