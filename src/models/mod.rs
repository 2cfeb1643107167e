pub mod context;
pub mod job;
pub mod report;
pub mod verification;
