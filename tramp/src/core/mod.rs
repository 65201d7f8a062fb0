//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action_queue;
pub mod filter;
pub mod log_record;
pub mod mode;
pub mod severity;
pub mod statistics;
pub mod types;
