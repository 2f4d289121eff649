pub mod catalog;
pub mod checkin;
pub mod enrollment;
