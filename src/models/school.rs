use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// School identifies an institution. Immutable once created.
/// Maps to `schools` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct School {
    pub id: String,
    pub name: String,
}

impl School {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Insert the school unless it already exists. Returns true when a row was created.
    pub async fn upsert(pool: &PgPool, school: &School) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO schools (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&school.id)
        .bind(&school.name)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<School>, sqlx::Error> {
        sqlx::query_as::<_, School>("SELECT id, name FROM schools WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<School>, sqlx::Error> {
        sqlx::query_as::<_, School>("SELECT id, name FROM schools ORDER BY id")
            .fetch_all(pool)
            .await
    }
}
