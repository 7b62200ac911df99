//! In-memory entry query for dry runs and tests.

use super::entry_query::EntryQuery;
use crate::models::ClassData;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Records every batch instead of writing it.
#[derive(Debug, Default)]
pub struct RecordingEntryQuery {
    batches: Mutex<Vec<ClassData>>,
}

impl RecordingEntryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<ClassData> {
        self.batches.lock().clone()
    }

    /// All recorded rows merged into one batch
    pub fn merged(&self) -> ClassData {
        let batches = self.batches.lock();
        let mut merged = ClassData::default();
        for batch in batches.iter() {
            merged.meeting_times.extend(batch.meeting_times.iter().cloned());
            merged.sections.extend(batch.sections.iter().cloned());
            merged.professors.extend(batch.professors.iter().cloned());
            merged.courses.extend(batch.courses.iter().cloned());
        }
        merged
    }
}

#[async_trait]
impl EntryQuery for RecordingEntryQuery {
    async fn insert_class_data(&self, data: ClassData) -> Result<(), sqlx::Error> {
        self.batches.lock().push(data);
        Ok(())
    }
}
