//! Email ingestion and reply pipeline.
//!
//! A single background task polls the mailbox on a fixed cadence and runs
//! each unseen, unprocessed message through:
//! 1. `parse_message()`: subject / sender / body extraction
//! 2. `ProcessedStore::add()`: recorded before any reply is attempted
//! 3. `new_email` notification
//! 4. `ReplyGenerator::generate()` → `Mailer::send()`
//! 5. `remove_email` notification once the reply is out
//!
//! Cycles never overlap, so the store and mailbox session need no locking.

pub mod processor;
pub mod runner;

pub use processor::{CycleReport, PipelineContext, PipelineState};
pub use runner::{PipelineHandle, spawn_pipeline};
