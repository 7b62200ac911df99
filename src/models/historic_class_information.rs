//! Append-only change log and the projections served by the sync feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Kind of mutation recorded in the change log. Maps to the `sync_action` enum type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sync_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Insert,
    Update,
    Delete,
}

/// Full change-log row. Maps to `historic_class_information` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoricClassInformation {
    pub sequence: i64,
    pub school_id: String,
    pub table_name: String,
    pub composite_hash: String,
    pub input_at: DateTime<Utc>,
    pub pk_fields: serde_json::Value,
    pub sync_action: SyncAction,
    /// `None` for deletes
    pub relevant_fields: Option<serde_json::Value>,
    pub term_collection_history_id: Option<i64>,
}

impl HistoricClassInformation {
    /// All change rows emitted by one collection run, in sequence order
    pub async fn list_for_history(
        pool: &PgPool,
        history_id: i64,
    ) -> Result<Vec<HistoricClassInformation>, sqlx::Error> {
        sqlx::query_as::<_, HistoricClassInformation>(
            r#"
            SELECT sequence, school_id, table_name, composite_hash, input_at, pk_fields,
                   sync_action, relevant_fields, term_collection_history_id
            FROM historic_class_information
            WHERE term_collection_history_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(history_id)
        .fetch_all(pool)
        .await
    }

    /// Term collections a change row is attributed to
    pub async fn term_dependencies(
        pool: &PgPool,
        sequence: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT term_collection_id
            FROM historic_class_information_term_dependencies
            WHERE historic_sequence = $1
            ORDER BY term_collection_id
            "#,
        )
        .bind(sequence)
        .fetch_all(pool)
        .await
    }
}

/// Wire form of one change served by the sync API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SyncChange {
    pub sequence: i64,
    pub table_name: String,
    pub pk_fields: serde_json::Value,
    pub sync_action: SyncAction,
    pub relevant_fields: Option<serde_json::Value>,
}

impl SyncChange {
    /// Changes across all schools after `last_sequence`
    pub async fn list_since(
        pool: &PgPool,
        last_sequence: i64,
        limit: i64,
    ) -> Result<Vec<SyncChange>, sqlx::Error> {
        sqlx::query_as::<_, SyncChange>(
            r#"
            SELECT sequence, table_name, pk_fields, sync_action, relevant_fields
            FROM historic_class_information
            WHERE sequence > $1
            ORDER BY sequence
            LIMIT $2
            "#,
        )
        .bind(last_sequence)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Changes for one school after `last_sequence`
    pub async fn list_for_school_since(
        pool: &PgPool,
        school_id: &str,
        last_sequence: i64,
        limit: i64,
    ) -> Result<Vec<SyncChange>, sqlx::Error> {
        sqlx::query_as::<_, SyncChange>(
            r#"
            SELECT sequence, table_name, pk_fields, sync_action, relevant_fields
            FROM historic_class_information
            WHERE school_id = $1 AND sequence > $2
            ORDER BY sequence
            LIMIT $3
            "#,
        )
        .bind(school_id)
        .bind(last_sequence)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Changes for one school attributed to any of the given term collections,
    /// each past its own cursor. Results are in global sequence order.
    pub async fn list_for_school_terms_since(
        pool: &PgPool,
        school_id: &str,
        term_cursors: &[(String, i64)],
        limit: i64,
    ) -> Result<Vec<SyncChange>, sqlx::Error> {
        let (term_ids, sequences): (Vec<String>, Vec<i64>) = term_cursors.iter().cloned().unzip();

        sqlx::query_as::<_, SyncChange>(
            r#"
            SELECT h.sequence, h.table_name, h.pk_fields, h.sync_action, h.relevant_fields
            FROM historic_class_information h
            WHERE h.school_id = $1
              AND EXISTS (
                  SELECT 1
                  FROM historic_class_information_term_dependencies d
                  JOIN UNNEST($2::text[], $3::bigint[]) AS cursor(term_collection_id, last_sequence)
                    ON cursor.term_collection_id = d.term_collection_id
                  WHERE d.historic_sequence = h.sequence
                    AND d.school_id = h.school_id
                    AND h.sequence > cursor.last_sequence
              )
            ORDER BY h.sequence
            LIMIT $4
            "#,
        )
        .bind(school_id)
        .bind(&term_ids)
        .bind(&sequences)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_change_wire_shape() {
        let change = SyncChange {
            sequence: 7,
            table_name: "sections".to_string(),
            pk_fields: json!({"school_id": "marist", "sequence": "111"}),
            sync_action: SyncAction::Delete,
            relevant_fields: None,
        };

        let value = serde_json::to_value(&change).expect("serialize");
        assert_eq!(value["sync_action"], "delete");
        assert!(value["relevant_fields"].is_null());
        assert_eq!(value["pk_fields"]["sequence"], "111");
    }
}
