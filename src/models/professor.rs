use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// An instructor. Maps to `professors` table, primary key `(school_id, id)`.
/// The id is chosen by the service, usually the email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Professor {
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub email_address: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub other: serde_json::Value,
}

impl Professor {
    pub async fn list_for_school(
        pool: &PgPool,
        school_id: &str,
    ) -> Result<Vec<Professor>, sqlx::Error> {
        sqlx::query_as::<_, Professor>(
            r#"
            SELECT id, school_id, name, email_address, first_name, last_name, other
            FROM professors
            WHERE school_id = $1
            ORDER BY id
            "#,
        )
        .bind(school_id)
        .fetch_all(pool)
        .await
    }
}
