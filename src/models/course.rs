use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Course identity within a school: `(subject_code, number)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseKey {
    pub subject_code: String,
    pub number: String,
}

/// A catalog course. Maps to `courses` table,
/// primary key `(school_id, subject_code, number)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub school_id: String,
    pub subject_code: String,
    pub number: String,
    pub subject_description: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub credit_hours: f64,
    pub prerequisites: Option<String>,
    pub corequisites: Option<String>,
    /// Service-specific extension fields
    pub other: serde_json::Value,
}

impl Course {
    pub fn key(&self) -> CourseKey {
        CourseKey {
            subject_code: self.subject_code.clone(),
            number: self.number.clone(),
        }
    }

    pub async fn find(
        pool: &PgPool,
        school_id: &str,
        subject_code: &str,
        number: &str,
    ) -> Result<Option<Course>, sqlx::Error> {
        sqlx::query_as::<_, Course>(
            r#"
            SELECT school_id, subject_code, number, subject_description, title, description,
                   credit_hours, prerequisites, corequisites, other
            FROM courses
            WHERE school_id = $1 AND subject_code = $2 AND number = $3
            "#,
        )
        .bind(school_id)
        .bind(subject_code)
        .bind(number)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_school(pool: &PgPool, school_id: &str) -> Result<Vec<Course>, sqlx::Error> {
        sqlx::query_as::<_, Course>(
            r#"
            SELECT school_id, subject_code, number, subject_description, title, description,
                   credit_hours, prerequisites, corequisites, other
            FROM courses
            WHERE school_id = $1
            ORDER BY subject_code, number
            "#,
        )
        .bind(school_id)
        .fetch_all(pool)
        .await
    }
}
