//! # Staging Functions
//!
//! Thin async wrappers around the PostgreSQL functions that prepare and
//! promote a collection run's staged snapshot.
//!
//! - `ready_courses_meetings_staging(history_id)` removes any staged rows left
//!   behind by an earlier attempt of the same run.
//! - `move_staged_courses_and_meetings(history_id)` diffs the staged rows
//!   against the live rows of the run's `(school, term collection)`, applies
//!   inserts, updates and deletes, appends one sequenced change-log row per
//!   mutation and clears the run's staging rows, all in one transaction.

use sqlx::PgPool;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct SqlFunctionExecutor {
    pool: PgPool,
}

impl SqlFunctionExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Clear staging rows scoped to one run. Sibling runs are untouched.
    #[instrument(skip(self))]
    pub async fn ready_courses_meetings_staging(&self, history_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT ready_courses_meetings_staging($1)")
            .bind(history_id)
            .execute(&self.pool)
            .await?;

        debug!(history_id, "Staging cleared");
        Ok(())
    }

    /// Promote a run's staged snapshot and return the number of change rows emitted.
    #[instrument(skip(self))]
    pub async fn move_staged_courses_and_meetings(&self, history_id: i64) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let changed: i64 = sqlx::query_scalar("SELECT move_staged_courses_and_meetings($1)")
            .bind(history_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(history_id, changed, "Staged snapshot promoted");
        Ok(changed)
    }
}
