//! Bulk inserts into the staging tables for one active run.

use crate::models::{ClassData, Course, MeetingTime, Professor, Section};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Postgres rejects statements with more bind parameters than this
const BIND_LIMIT: usize = 65_535;

#[async_trait]
pub trait EntryQuery: Send + Sync {
    /// Append one batch of staged rows. Callers deduplicate by primary key;
    /// no deduplication happens here.
    async fn insert_class_data(&self, data: ClassData) -> Result<(), sqlx::Error>;
}

/// Entry query bound to `(school_id, term_collection_id, history_id)`.
///
/// The bound identifiers overwrite whatever the rows carry.
#[derive(Debug, Clone)]
pub struct StagingEntryQuery {
    pool: PgPool,
    school_id: String,
    term_collection_id: String,
    history_id: i64,
}

impl StagingEntryQuery {
    pub fn new(
        pool: PgPool,
        school_id: impl Into<String>,
        term_collection_id: impl Into<String>,
        history_id: i64,
    ) -> Self {
        Self {
            pool,
            school_id: school_id.into(),
            term_collection_id: term_collection_id.into(),
            history_id,
        }
    }

    pub fn school_id(&self) -> &str {
        &self.school_id
    }

    pub fn term_collection_id(&self) -> &str {
        &self.term_collection_id
    }

    pub fn history_id(&self) -> i64 {
        self.history_id
    }

    async fn insert_courses(&self, rows: &[Course]) -> Result<(), sqlx::Error> {
        const COLUMNS: usize = 11;
        for chunk in rows.chunks(BIND_LIMIT / COLUMNS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO staging_courses (school_id, subject_code, number, \
                 subject_description, title, description, credit_hours, prerequisites, \
                 corequisites, other, term_collection_history_id) ",
            );
            builder.push_values(chunk, |mut b, course| {
                b.push_bind(&self.school_id)
                    .push_bind(&course.subject_code)
                    .push_bind(&course.number)
                    .push_bind(&course.subject_description)
                    .push_bind(&course.title)
                    .push_bind(&course.description)
                    .push_bind(course.credit_hours)
                    .push_bind(&course.prerequisites)
                    .push_bind(&course.corequisites)
                    .push_bind(&course.other)
                    .push_bind(self.history_id);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_professors(&self, rows: &[Professor]) -> Result<(), sqlx::Error> {
        const COLUMNS: usize = 8;
        for chunk in rows.chunks(BIND_LIMIT / COLUMNS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO staging_professors (id, school_id, name, email_address, \
                 first_name, last_name, other, term_collection_history_id) ",
            );
            builder.push_values(chunk, |mut b, professor| {
                b.push_bind(&professor.id)
                    .push_bind(&self.school_id)
                    .push_bind(&professor.name)
                    .push_bind(&professor.email_address)
                    .push_bind(&professor.first_name)
                    .push_bind(&professor.last_name)
                    .push_bind(&professor.other)
                    .push_bind(self.history_id);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_sections(&self, rows: &[Section]) -> Result<(), sqlx::Error> {
        const COLUMNS: usize = 12;
        for chunk in rows.chunks(BIND_LIMIT / COLUMNS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO staging_sections (sequence, term_collection_id, subject_code, \
                 course_number, school_id, max_enrollment, enrollment, instruction_method, \
                 campus, primary_professor_id, other, term_collection_history_id) ",
            );
            builder.push_values(chunk, |mut b, section| {
                b.push_bind(&section.sequence)
                    .push_bind(&self.term_collection_id)
                    .push_bind(&section.subject_code)
                    .push_bind(&section.course_number)
                    .push_bind(&self.school_id)
                    .push_bind(section.max_enrollment)
                    .push_bind(section.enrollment)
                    .push_bind(&section.instruction_method)
                    .push_bind(&section.campus)
                    .push_bind(&section.primary_professor_id)
                    .push_bind(&section.other)
                    .push_bind(self.history_id);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_meeting_times(&self, rows: &[MeetingTime]) -> Result<(), sqlx::Error> {
        const COLUMNS: usize = 20;
        for chunk in rows.chunks(BIND_LIMIT / COLUMNS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO staging_meeting_times (sequence, section_sequence, \
                 term_collection_id, subject_code, course_number, school_id, start_date, \
                 end_date, meeting_type, start_minutes, end_minutes, is_monday, is_tuesday, \
                 is_wednesday, is_thursday, is_friday, is_saturday, is_sunday, other, \
                 term_collection_history_id) ",
            );
            builder.push_values(chunk, |mut b, meeting| {
                b.push_bind(meeting.sequence)
                    .push_bind(&meeting.section_sequence)
                    .push_bind(&self.term_collection_id)
                    .push_bind(&meeting.subject_code)
                    .push_bind(&meeting.course_number)
                    .push_bind(&self.school_id)
                    .push_bind(meeting.start_date)
                    .push_bind(meeting.end_date)
                    .push_bind(&meeting.meeting_type)
                    .push_bind(meeting.start_minutes)
                    .push_bind(meeting.end_minutes)
                    .push_bind(meeting.is_monday)
                    .push_bind(meeting.is_tuesday)
                    .push_bind(meeting.is_wednesday)
                    .push_bind(meeting.is_thursday)
                    .push_bind(meeting.is_friday)
                    .push_bind(meeting.is_saturday)
                    .push_bind(meeting.is_sunday)
                    .push_bind(&meeting.other)
                    .push_bind(self.history_id);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EntryQuery for StagingEntryQuery {
    async fn insert_class_data(&self, data: ClassData) -> Result<(), sqlx::Error> {
        if data.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            school_id = %self.school_id,
            term_collection_id = %self.term_collection_id,
            history_id = self.history_id,
            rows = data.row_count(),
            "Staging class data"
        );

        // chunks() of an empty slice yields nothing, so empty tables issue no statement
        tokio::try_join!(
            self.insert_meeting_times(&data.meeting_times),
            self.insert_sections(&data.sections),
            self.insert_professors(&data.professors),
            self.insert_courses(&data.courses),
        )?;
        Ok(())
    }
}
