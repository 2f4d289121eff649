//! Storage backing the repository traits, plus JSON seed loading for the collaborator-owned
//! catalog.
//!
//! `PgStore` is the shared backend: its tables carry the unique indexes and conditional
//! updates the workflows rely on. The in-process stores keep each table behind one mutex and
//! apply every trait call as a single critical section, which gives a single instance the
//! same guarantees without a database.

mod memory;
mod postgres;
mod seed;

pub use memory::{
    InMemoryBatchStore, InMemoryCheckInStore, InMemoryRegistrationLedger,
    InMemorySessionDirectory,
};
pub use postgres::{PgStore, PostgresError};
pub use seed::{RegistrationSeed, SeedData, SeedError, SeedSummary, SessionSeed};
