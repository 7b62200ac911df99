//! # Database Operations
//!
//! Connection management, the embedded schema migrator and wrappers around
//! the staging PostgreSQL functions.
//!
//! ## Key Components
//!
//! - [`connection`] - Pool construction, health checks and the guarded reset
//! - [`migrator`] - Forward-only schema embedded from `migrations/`
//! - [`sql_functions`] - Staging preparation and snapshot promotion
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use catalog_sync::config::CatalogConfig;
//! use catalog_sync::database::{DatabaseConnection, SqlFunctionExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CatalogConfig::from_env()?;
//! let db = DatabaseConnection::connect(&config).await?;
//! let executor = SqlFunctionExecutor::new(db.pool().clone());
//! let changed = executor.move_staged_courses_and_meetings(42).await?;
//! println!("promoted run 42 with {changed} changes");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrator;
pub mod sql_functions;

pub use connection::{reset_catalog, DatabaseConnection};
pub use migrator::MIGRATOR;
pub use sql_functions::SqlFunctionExecutor;
