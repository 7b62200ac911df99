//! # Staging
//!
//! Write side of a collection run. Services hand deduplicated [`ClassData`]
//! to an [`EntryQuery`] bound to the active run; the promote step in
//! [`crate::database::sql_functions`] later moves it to the live tables.
//!
//! [`ClassData`]: crate::models::ClassData

pub mod entry_query;
pub mod recording;

pub use entry_query::{EntryQuery, StagingEntryQuery};
pub use recording::RecordingEntryQuery;
