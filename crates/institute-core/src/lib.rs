pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod identity;
pub mod storage;
pub mod telemetry;
pub mod workflows;
