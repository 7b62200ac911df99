use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A scheduled meeting of a section. Maps to `meeting_times` table; the
/// primary key extends the section key with `sequence` so a section can
/// meet several times a week in different patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MeetingTime {
    pub sequence: i32,
    pub section_sequence: String,
    pub term_collection_id: String,
    pub subject_code: String,
    pub course_number: String,
    pub school_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub meeting_type: Option<String>,
    pub start_minutes: Option<NaiveTime>,
    pub end_minutes: Option<NaiveTime>,
    pub is_monday: bool,
    pub is_tuesday: bool,
    pub is_wednesday: bool,
    pub is_thursday: bool,
    pub is_friday: bool,
    pub is_saturday: bool,
    pub is_sunday: bool,
    pub other: serde_json::Value,
}

impl MeetingTime {
    pub async fn list_for_term(
        pool: &PgPool,
        school_id: &str,
        term_collection_id: &str,
    ) -> Result<Vec<MeetingTime>, sqlx::Error> {
        sqlx::query_as::<_, MeetingTime>(
            r#"
            SELECT sequence, section_sequence, term_collection_id, subject_code, course_number,
                   school_id, start_date, end_date, meeting_type, start_minutes, end_minutes,
                   is_monday, is_tuesday, is_wednesday, is_thursday, is_friday, is_saturday,
                   is_sunday, other
            FROM meeting_times
            WHERE school_id = $1 AND term_collection_id = $2
            ORDER BY subject_code, course_number, section_sequence, sequence
            "#,
        )
        .bind(school_id)
        .bind(term_collection_id)
        .fetch_all(pool)
        .await
    }
}
