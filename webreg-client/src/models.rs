//! Plain records exchanged with the backend

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Deserialize a field that may be missing, `null`, or present
///
/// The backend omits fields and sends `null` freely; both collapse to the
/// type's zero value instead of failing the whole response.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An academic term (e.g. a quarter or a summer session)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Term {
    /// Human readable description, e.g. "Summer Session I 2018"
    #[serde(rename = "termDesc", default, deserialize_with = "lenient")]
    pub description: String,
    /// Term code, e.g. "S118"
    #[serde(rename = "termCode", default, deserialize_with = "lenient")]
    pub code: String,
    /// Backend sequence id used by the term-scoping calls
    #[serde(rename = "seqId", default, deserialize_with = "lenient")]
    pub sequence_id: i64,
}

/// A subject area, e.g. "CSE"
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Subject {
    #[serde(rename = "LONG_DESC", default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(rename = "SUBJECT_CODE", default, deserialize_with = "lenient")]
    pub code: String,
}

/// Identifies a course, and optionally one of its sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CourseId {
    pub subject: String,
    pub code: String,
    /// Section number, 0 when no section has been chosen
    pub section: u32,
}

impl CourseId {
    pub fn new(subject: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            code: code.into(),
            section: 0,
        }
    }

    /// Same course with a specific section selected
    pub fn with_section(mut self, section: u32) -> Self {
        self.section = section;
        self
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject, self.code)?;
        if self.section > 0 {
            write!(f, ", {}", self.section)?;
        }
        Ok(())
    }
}

/// Grading option requested at enrollment time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradingOption {
    #[default]
    Letter,
    PassNoPass,
    SatisfactoryUnsatisfactory,
}

impl GradingOption {
    /// Single-letter code the backend expects in form bodies
    pub fn code(self) -> &'static str {
        match self {
            GradingOption::Letter => "L",
            GradingOption::PassNoPass => "P",
            GradingOption::SatisfactoryUnsatisfactory => "S",
        }
    }
}

/// A course section together with the enrollment options for it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub grading_option: GradingOption,
    /// Unit count; filled in from the backend default by `edit_enroll`/`edit_wait`
    pub unit: f64,
    pub term_code: String,
}

/// One prerequisite of a course, with its ordering group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisite {
    pub order: i64,
    pub course: CourseId,
}

/// Free text attached to a course in search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseText {
    pub text: String,
    pub course_id: String,
}

/// Enrollment pass appointment information for a term
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassMessage {
    pub first_pass_begin: Option<NaiveDateTime>,
    pub first_pass_end: Option<NaiveDateTime>,
    pub second_pass_begin: Option<NaiveDateTime>,
    pub second_pass_end: Option<NaiveDateTime>,
    pub appointment_timer: String,
    pub college_code: String,
    pub display: String,
}

/// Window during which classes may be added for a term
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Student profile scraped from the portal sidebar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub college: String,
    pub major: String,
    pub level: String,
    pub balance: String,
}

/// One row of the backend's section listings (`get-class`, `search-load-group-data`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CourseSectionInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub person_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub enroll_status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub grade_option: String,
    #[serde(default, deserialize_with = "lenient")]
    pub subj_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub sect_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub section_number: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_title: String,
    #[serde(default, deserialize_with = "lenient")]
    pub long_desc: String,
    #[serde(default, deserialize_with = "lenient")]
    pub person_full_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub term_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub day_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub begin_hh_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub end_hh_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub begin_mm_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub end_mm_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub bldg_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub room_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub sect_credit_hrs: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub fk_cdi_instr_type: String,
    #[serde(default, deserialize_with = "lenient")]
    pub fk_sst_sctn_statcd: String,
    #[serde(default, deserialize_with = "lenient")]
    pub primary_instr_flag: String,
    #[serde(default, deserialize_with = "lenient")]
    pub avail_seat: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub count_on_waitlist: String,
    #[serde(default, deserialize_with = "lenient")]
    pub sctn_cpcty_qty: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub sctn_enrlt_qty: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub section_start_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub section_end_date: String,
}

impl CourseSectionInfo {
    /// Course id of this row with its section selected
    pub fn course_id(&self) -> CourseId {
        CourseId::new(self.subj_code.trim(), self.crse_code.trim())
            .with_section(self.section_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_id_display() {
        let id = CourseId::new("CSE", "100");
        assert_eq!(id.to_string(), "CSE 100");
        assert_eq!(id.with_section(123456).to_string(), "CSE 100, 123456");
    }

    #[test]
    fn test_grading_option_codes() {
        assert_eq!(GradingOption::Letter.code(), "L");
        assert_eq!(GradingOption::PassNoPass.code(), "P");
        assert_eq!(GradingOption::SatisfactoryUnsatisfactory.code(), "S");
    }

    #[test]
    fn test_term_deserialize_with_missing_and_null_fields() {
        let terms: Vec<Term> = serde_json::from_str(
            r#"[{"termCode":"S118","termDesc":"Summer Session I 2018","seqId":3180},
                {"termCode":"FA18","termDesc":null}]"#,
        )
        .unwrap();
        assert_eq!(terms[0].sequence_id, 3180);
        assert_eq!(terms[1].code, "FA18");
        assert_eq!(terms[1].description, "");
        assert_eq!(terms[1].sequence_id, 0);
    }

    #[test]
    fn test_section_info_tolerates_sparse_rows() {
        let rows: Vec<CourseSectionInfo> = serde_json::from_str(
            r#"[{"SUBJ_CODE":"MAE ","CRSE_CODE":"  8","SECTION_NUMBER":41234,"FK_CDI_INSTR_TYPE":"DI","UNKNOWN":1}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].course_id(), CourseId::new("MAE", "8").with_section(41234));
        assert_eq!(rows[0].avail_seat, 0);
        assert_eq!(rows[0].fk_cdi_instr_type, "DI");
    }
}
