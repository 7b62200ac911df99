use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;

/// Lifecycle state of a collection run. Maps to the `collection_status` enum type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "collection_status")]
pub enum CollectionStatus {
    Active,
    Success,
    Failure,
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CollectionStatus::Active => "Active",
            CollectionStatus::Success => "Success",
            CollectionStatus::Failure => "Failure",
        };
        f.write_str(label)
    }
}

/// One row per collection run. Maps to `term_collection_history` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TermCollectionHistory {
    pub id: i64,
    pub status: CollectionStatus,
    pub term_collection_id: String,
    pub school_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_full: bool,
}

impl TermCollectionHistory {
    /// Open a new run in the `Active` state
    pub async fn open(
        pool: &PgPool,
        school_id: &str,
        term_collection_id: &str,
        is_full: bool,
    ) -> Result<TermCollectionHistory, sqlx::Error> {
        sqlx::query_as::<_, TermCollectionHistory>(
            r#"
            INSERT INTO term_collection_history
                (status, term_collection_id, school_id, start_time, is_full)
            VALUES ('Active', $1, $2, NOW(), $3)
            RETURNING id, status, term_collection_id, school_id, start_time, end_time, is_full
            "#,
        )
        .bind(term_collection_id)
        .bind(school_id)
        .bind(is_full)
        .fetch_one(pool)
        .await
    }

    /// Close a run. Only `Active` runs transition; closing twice is a no-op
    /// that returns the stored row.
    pub async fn finish(
        pool: &PgPool,
        id: i64,
        status: CollectionStatus,
    ) -> Result<TermCollectionHistory, sqlx::Error> {
        let updated = sqlx::query_as::<_, TermCollectionHistory>(
            r#"
            UPDATE term_collection_history
            SET status = $2, end_time = NOW()
            WHERE id = $1 AND status = 'Active'
            RETURNING id, status, term_collection_id, school_id, start_time, end_time, is_full
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(history) => Ok(history),
            None => Self::find_by_id(pool, id)
                .await?
                .ok_or(sqlx::Error::RowNotFound),
        }
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: i64,
    ) -> Result<Option<TermCollectionHistory>, sqlx::Error> {
        sqlx::query_as::<_, TermCollectionHistory>(
            r#"
            SELECT id, status, term_collection_id, school_id, start_time, end_time, is_full
            FROM term_collection_history
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_term(
        pool: &PgPool,
        school_id: &str,
        term_collection_id: &str,
    ) -> Result<Vec<TermCollectionHistory>, sqlx::Error> {
        sqlx::query_as::<_, TermCollectionHistory>(
            r#"
            SELECT id, status, term_collection_id, school_id, start_time, end_time, is_full
            FROM term_collection_history
            WHERE school_id = $1 AND term_collection_id = $2
            ORDER BY id
            "#,
        )
        .bind(school_id)
        .bind(term_collection_id)
        .fetch_all(pool)
        .await
    }
}
