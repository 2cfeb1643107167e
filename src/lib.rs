//! Batch Document Verification Client
//!
//! This library submits batch verification jobs (a structured record list plus
//! a set of source documents) to the verification pipeline backend, polls
//! their progress on a fixed cadence, and turns the backend's flat per-record
//! payload into structured match reports.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use error::WorkflowError;
pub use workflow::{Outcome, WorkflowController, WorkflowOptions, WorkflowPhase};
