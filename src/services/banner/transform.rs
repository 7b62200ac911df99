//! Banner rows to catalog rows.

use super::wire::{BannerFaculty, BannerMeetingTime, BannerSection, BannerTerm};
use crate::http::UpstreamError;
use crate::models::{
    ClassData, Course, CourseKey, MeetingTime, Professor, Season, Section, SectionKey,
    TermCollection,
};
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use std::collections::BTreeMap;

const VIEW_ONLY_SUFFIX: &str = "(View Only)";

/// Decode one entry of `getTerms`. Terms whose description names no season
/// (e.g. continuing-education catalogs) are skipped.
pub fn decode_term(
    school_id: &str,
    term: &BannerTerm,
) -> Result<Option<TermCollection>, UpstreamError> {
    let year = term
        .code
        .get(0..4)
        .and_then(|digits| digits.parse::<i32>().ok())
        .ok_or_else(|| {
            UpstreamError::assumption_violation(
                "getTerms",
                format!("term code {:?} does not start with a year", term.code),
            )
        })?;

    let Some(season) = Season::from_description(&term.description) else {
        return Ok(None);
    };

    let description = term.description.trim();
    let still_collecting = !description.ends_with(VIEW_ONLY_SUFFIX);
    let name = description.trim_end_matches(VIEW_ONLY_SUFFIX).trim_end();

    Ok(Some(TermCollection {
        id: term.code.clone(),
        school_id: school_id.to_string(),
        year,
        season,
        name: Some(name.to_string()),
        still_collecting,
    }))
}

/// `"HHMM"` to a time of day; anything else is `None`.
pub fn parse_time(raw: Option<&str>) -> Option<NaiveTime> {
    let raw = raw?;
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours = raw[0..2].parse().ok()?;
    let minutes = raw[2..4].parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// `MM/DD/YYYY` pair. If either side fails to parse, both are dropped.
pub fn parse_dates(
    start: Option<&str>,
    end: Option<&str>,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let parse = |raw: Option<&str>| raw.and_then(|s| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok());
    match (parse(start), parse(end)) {
        (Some(start), Some(end)) => (Some(start), Some(end)),
        _ => (None, None),
    }
}

/// `"Last, First"` to `(first, last)`; any other shape leaves both empty.
pub fn split_display_name(display_name: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = display_name.split(", ").collect();
    match parts.as_slice() {
        [last, first] => (Some(first.to_string()), Some(last.to_string())),
        _ => (None, None),
    }
}

fn faculty_email(faculty: &BannerFaculty) -> Option<&str> {
    faculty
        .email_address
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
}

/// Collects search pages into one deduplicated batch.
#[derive(Debug)]
pub struct ClassAccumulator {
    school_id: String,
    term_collection_id: String,
    courses: BTreeMap<CourseKey, Course>,
    professors: BTreeMap<String, Professor>,
    sections: BTreeMap<SectionKey, Section>,
    meeting_times: BTreeMap<(SectionKey, i32), MeetingTime>,
    crns: BTreeMap<String, CourseKey>,
}

impl ClassAccumulator {
    pub fn new(school_id: &str, term_collection_id: &str) -> Self {
        Self {
            school_id: school_id.to_string(),
            term_collection_id: term_collection_id.to_string(),
            courses: BTreeMap::new(),
            professors: BTreeMap::new(),
            sections: BTreeMap::new(),
            meeting_times: BTreeMap::new(),
            crns: BTreeMap::new(),
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Distinct course reference numbers seen so far
    pub fn crns(&self) -> Vec<String> {
        self.crns.keys().cloned().collect()
    }

    /// First description wins for a course shared by several CRNs.
    pub fn attach_description(&mut self, crn: &str, description: String) {
        let Some(key) = self.crns.get(crn) else {
            return;
        };
        if let Some(course) = self.courses.get_mut(key) {
            if course.description.is_none() {
                course.description = Some(description);
            }
        }
    }

    /// Fold one Banner section in. Later duplicates of a key are ignored.
    pub fn add_section(&mut self, raw: BannerSection) {
        let course_key = CourseKey {
            subject_code: raw.subject.clone(),
            number: raw.course_number.clone(),
        };
        let section_key = SectionKey {
            course: course_key.clone(),
            sequence: raw.sequence_number.clone(),
        };
        if self.sections.contains_key(&section_key) {
            return;
        }

        self.crns
            .entry(raw.course_reference_number.clone())
            .or_insert_with(|| course_key.clone());

        self.courses
            .entry(course_key)
            .or_insert_with(|| Course {
                school_id: self.school_id.clone(),
                subject_code: raw.subject.clone(),
                number: raw.course_number.clone(),
                subject_description: raw.subject_description.clone(),
                title: raw.course_title.clone(),
                description: None,
                credit_hours: raw.credit_hours.or(raw.credit_hour_low).unwrap_or(0.0),
                prerequisites: None,
                corequisites: None,
                other: json!({}),
            });

        let faculty = raw.faculty.clone().unwrap_or_default();
        let mut primary_professor_id = None;
        for member in &faculty {
            let Some(email) = faculty_email(member) else {
                continue;
            };
            if member.primary_indicator && primary_professor_id.is_none() {
                primary_professor_id = Some(email.to_string());
            }
            self.professors
                .entry(email.to_string())
                .or_insert_with(|| {
                    let (first_name, last_name) = split_display_name(&member.display_name);
                    Professor {
                        id: email.to_string(),
                        school_id: self.school_id.clone(),
                        name: member.display_name.clone(),
                        email_address: Some(email.to_string()),
                        first_name,
                        last_name,
                        other: json!({ "banner_id": member.banner_id }),
                    }
                });
        }

        let meetings = raw.meetings_faculty.clone().unwrap_or_default();
        for (index, meeting) in meetings.iter().enumerate() {
            let sequence = index as i32;
            let row = self.meeting_time(&raw, sequence, &meeting.meeting_time);
            self.meeting_times.insert((section_key.clone(), sequence), row);
        }

        self.sections.insert(
            section_key,
            Section {
                sequence: raw.sequence_number.clone(),
                term_collection_id: self.term_collection_id.clone(),
                subject_code: raw.subject.clone(),
                course_number: raw.course_number.clone(),
                school_id: self.school_id.clone(),
                max_enrollment: raw.maximum_enrollment,
                enrollment: raw.enrollment,
                instruction_method: raw.instructional_method_description.clone(),
                campus: raw.campus_description.clone(),
                primary_professor_id,
                other: json!({
                    "course_reference_number": raw.course_reference_number,
                    "schedule_type": raw.schedule_type_description,
                    "seats_available": raw.seats_available,
                }),
            },
        );
    }

    fn meeting_time(
        &self,
        raw: &BannerSection,
        sequence: i32,
        time: &BannerMeetingTime,
    ) -> MeetingTime {
        let (start_date, end_date) =
            parse_dates(time.start_date.as_deref(), time.end_date.as_deref());
        MeetingTime {
            sequence,
            section_sequence: raw.sequence_number.clone(),
            term_collection_id: self.term_collection_id.clone(),
            subject_code: raw.subject.clone(),
            course_number: raw.course_number.clone(),
            school_id: self.school_id.clone(),
            start_date,
            end_date,
            meeting_type: time.meeting_type_description.clone(),
            start_minutes: parse_time(time.begin_time.as_deref()),
            end_minutes: parse_time(time.end_time.as_deref()),
            is_monday: time.monday,
            is_tuesday: time.tuesday,
            is_wednesday: time.wednesday,
            is_thursday: time.thursday,
            is_friday: time.friday,
            is_saturday: time.saturday,
            is_sunday: time.sunday,
            other: json!({
                "building": time.building,
                "building_description": time.building_description,
                "room": time.room,
            }),
        }
    }

    pub fn into_class_data(self) -> ClassData {
        ClassData {
            meeting_times: self.meeting_times.into_values().collect(),
            sections: self.sections.into_values().collect(),
            professors: self.professors.into_values().collect(),
            courses: self.courses.into_values().collect(),
        }
    }
}
