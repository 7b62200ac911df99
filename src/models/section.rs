use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use super::course::CourseKey;

/// Section identity within a school and term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionKey {
    pub course: CourseKey,
    pub sequence: String,
}

/// One offering of a course in a term. Maps to `sections` table, primary key
/// `(school_id, term_collection_id, subject_code, course_number, sequence)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub sequence: String,
    pub term_collection_id: String,
    pub subject_code: String,
    pub course_number: String,
    pub school_id: String,
    pub max_enrollment: Option<i32>,
    pub enrollment: Option<i32>,
    pub instruction_method: Option<String>,
    pub campus: Option<String>,
    pub primary_professor_id: Option<String>,
    pub other: serde_json::Value,
}

impl Section {
    pub fn key(&self) -> SectionKey {
        SectionKey {
            course: CourseKey {
                subject_code: self.subject_code.clone(),
                number: self.course_number.clone(),
            },
            sequence: self.sequence.clone(),
        }
    }

    pub async fn list_for_term(
        pool: &PgPool,
        school_id: &str,
        term_collection_id: &str,
    ) -> Result<Vec<Section>, sqlx::Error> {
        sqlx::query_as::<_, Section>(
            r#"
            SELECT sequence, term_collection_id, subject_code, course_number, school_id,
                   max_enrollment, enrollment, instruction_method, campus,
                   primary_professor_id, other
            FROM sections
            WHERE school_id = $1 AND term_collection_id = $2
            ORDER BY subject_code, course_number, sequence
            "#,
        )
        .bind(school_id)
        .bind(term_collection_id)
        .fetch_all(pool)
        .await
    }
}
