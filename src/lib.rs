#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Catalog Sync
//!
//! Aggregates university course catalogs from upstream registration systems
//! into one normalized store and republishes every change as a sequenced feed.
//!
//! ## Architecture
//!
//! A collection run scrapes one `(school, term collection)` snapshot through a
//! [`services::Service`] adapter into staging tables, then a database-side
//! promote diffs staging against live rows, applies the difference and appends
//! one change row per mutation. Clients tail the change log through the sync
//! API with an opaque sequence cursor.
//!
//! ## Module Organization
//!
//! - [`http`] - Rate-limited, retrying, reporting upstream HTTP stack
//! - [`staging`] - Bulk writes into the staging tables for one run
//! - [`services`] - Upstream adapters (Banner)
//! - [`orchestration`] - Run driver and queue-driven scheduler
//! - [`messaging`] - pgmq collection job queue
//! - [`database`] - Pool, migrations and the staging/promote procedures
//! - [`models`] - Live rows, run history and the change log
//! - [`web`] - Sync API
//! - [`config`], [`logging`], [`error`], [`constants`] - Ambient plumbing
//!
//! ## Testing
//!
//! Unit tests need nothing external. Integration tests under `tests/` need a
//! scratch PostgreSQL database in `TEST_DB_CONN` and are skipped without one.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod http;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod staging;
pub mod web;

pub use config::{CatalogConfig, SchedulerConfig, ServicesConfig};
pub use database::{DatabaseConnection, SqlFunctionExecutor, MIGRATOR};
pub use error::{CatalogError, Result};
pub use orchestration::{Orchestrator, Scheduler};
