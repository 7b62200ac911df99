//! # Orchestration
//!
//! Collection run driving ([`Orchestrator`]) and the queue-driven
//! [`Scheduler`] that feeds it.

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{
    CollectionRunSummary, CollectionRunner, Orchestrator, RunningCollection, SchoolWithService,
};
pub use scheduler::{enqueue_active_terms, enqueue_terms, process_message, MessageOutcome, Scheduler};
