//! Banner JSON shapes. Required fields are non-optional so schema drift shows
//! up as a decode failure.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BannerTerm {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default)]
    pub success: bool,
    pub total_count: u32,
    pub data: Option<Vec<BannerSection>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerSection {
    pub course_reference_number: String,
    pub subject: String,
    pub subject_description: Option<String>,
    pub course_number: String,
    pub sequence_number: String,
    pub campus_description: Option<String>,
    pub schedule_type_description: Option<String>,
    pub course_title: Option<String>,
    pub credit_hours: Option<f64>,
    pub credit_hour_low: Option<f64>,
    pub maximum_enrollment: Option<i32>,
    pub enrollment: Option<i32>,
    pub seats_available: Option<i32>,
    pub instructional_method_description: Option<String>,
    pub faculty: Option<Vec<BannerFaculty>>,
    pub meetings_faculty: Option<Vec<BannerMeetingFaculty>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerFaculty {
    pub banner_id: Option<String>,
    pub display_name: String,
    pub email_address: Option<String>,
    #[serde(default)]
    pub primary_indicator: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMeetingFaculty {
    pub meeting_time: BannerMeetingTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMeetingTime {
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub monday: bool,
    #[serde(default)]
    pub tuesday: bool,
    #[serde(default)]
    pub wednesday: bool,
    #[serde(default)]
    pub thursday: bool,
    #[serde(default)]
    pub friday: bool,
    #[serde(default)]
    pub saturday: bool,
    #[serde(default)]
    pub sunday: bool,
    pub meeting_type_description: Option<String>,
    pub building: Option<String>,
    pub building_description: Option<String>,
    pub room: Option<String>,
}
