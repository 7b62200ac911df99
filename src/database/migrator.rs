//! Forward-only schema embedded at compile time from `migrations/`.

/// Catalog tables, staging shadows and the promote functions
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
