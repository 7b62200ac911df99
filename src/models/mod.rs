//! # Data Model
//!
//! Row types for the live catalog tables, the collection history and the
//! append-only change log. Every record belongs to a school; composite keys
//! are spelled out on each type.

pub mod course;
pub mod historic_class_information;
pub mod meeting_time;
pub mod professor;
pub mod school;
pub mod section;
pub mod term_collection;
pub mod term_collection_history;

pub use course::{Course, CourseKey};
pub use historic_class_information::{HistoricClassInformation, SyncAction, SyncChange};
pub use meeting_time::MeetingTime;
pub use professor::Professor;
pub use school::School;
pub use section::{Section, SectionKey};
pub use term_collection::{Season, Term, TermCollection};
pub use term_collection_history::{CollectionStatus, TermCollectionHistory};

/// One service call's worth of staged rows, already deduplicated by primary key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassData {
    pub meeting_times: Vec<MeetingTime>,
    pub sections: Vec<Section>,
    pub professors: Vec<Professor>,
    pub courses: Vec<Course>,
}

impl ClassData {
    pub fn is_empty(&self) -> bool {
        self.meeting_times.is_empty()
            && self.sections.is_empty()
            && self.professors.is_empty()
            && self.courses.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.meeting_times.len() + self.sections.len() + self.professors.len() + self.courses.len()
    }
}
