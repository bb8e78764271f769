//! Backend endpoint table and the JSON shapes each endpoint answers with

use crate::models::{CourseId, CourseText, PassMessage, Prerequisite, lenient};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Deserialize;

/// Indicator value both envelope fields must carry on success
pub const SUCCESS_TOKEN: &str = "SUCCESS";

/// A backend endpoint path and whether it needs a selected term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    /// Endpoints under `secure/` fail server-side unless the term-scoping
    /// calls have been made first
    pub term_scoped: bool,
}

impl Endpoint {
    const fn open(path: &'static str) -> Self {
        Self {
            path,
            term_scoped: false,
        }
    }

    const fn secure(path: &'static str) -> Self {
        Self {
            path,
            term_scoped: true,
        }
    }
}

pub const GET_TERM: Endpoint = Endpoint::open("/webreg2/svc/wradapter/get-term");
pub const CHECK_ELIGIBILITY: Endpoint = Endpoint::open("/webreg2/svc/wradapter/check-eligibility");
pub const GET_STATUS_START: Endpoint = Endpoint::open("/webreg2/svc/wradapter/get-status-start");
pub const WR_LOGGER: Endpoint = Endpoint::open("/webreg2/svc/wradapter/wr-logger");

pub const SEARCH_LOAD_SUBJECT: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-load-subject");
pub const SEARCH_GET_CRSE_LIST: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-get-crse-list");
pub const GET_CLASS: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/get-class");
pub const GET_PREREQUISITES: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/get-prerequisites");
pub const GET_PREAUTH_INFO: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/get-preauth-info");
pub const ADD_ENROLL: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/add-enroll");
pub const DROP_ENROLL: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/drop-enroll");
pub const EDIT_ENROLL: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/edit-enroll");
pub const ADD_WAIT: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/add-wait");
pub const DROP_WAIT: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/drop-wait");
pub const EDIT_WAIT: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/edit-wait");
pub const SEND_EMAIL: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/send-email");
pub const GET_ENROLL_ADD_DATES: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/get-enroll-add-dates");
pub const GET_MSG_PASS: Endpoint = Endpoint::secure("/webreg2/svc/wradapter/secure/get-msg-pass");
pub const SEARCH_GET_CATALOG: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-get-catalog");
pub const SEARCH_GET_RESTRICTION: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-get-restriction");
pub const SEARCH_GET_SECTION_TEXT: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-get-section-text");
pub const SEARCH_GET_CRSE_TEXT: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-get-crse-text");
pub const SEARCH_LOAD_GROUP_DATA: Endpoint =
    Endpoint::secure("/webreg2/svc/wradapter/secure/search-load-group-data");

/// Success/warning triple returned by mutating endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Envelope {
    #[serde(default, deserialize_with = "lenient")]
    pub opsiv: String,
    #[serde(default, deserialize_with = "lenient")]
    pub ops: String,
    #[serde(default, deserialize_with = "lenient")]
    pub warning: String,
}

impl Envelope {
    /// Both indicators agree and carry the success token
    pub fn is_success(&self) -> bool {
        self.opsiv == self.ops && self.opsiv == SUCCESS_TOKEN
    }
}

/// Envelope of `edit-enroll` / `edit-wait`, carrying the section defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EditEnvelope {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default, deserialize_with = "lenient")]
    pub grade: String,
    #[serde(default, deserialize_with = "lenient")]
    pub unit_default: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub grade_default: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct EligibilityResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default, deserialize_with = "lenient")]
    pub flag0: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub flag1: i64,
}

impl EligibilityResponse {
    /// Only the first indicator is meaningful for eligibility checks
    pub fn is_eligible(&self) -> bool {
        self.envelope.opsiv == SUCCESS_TOKEN
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StatusStartRow {
    #[serde(default, deserialize_with = "lenient")]
    pub academic_level: String,
    #[serde(default, deserialize_with = "lenient")]
    pub regis_status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub academic_status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub term_seq_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CourseRow {
    #[serde(default, deserialize_with = "lenient")]
    pub subj_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PrerequisiteRow {
    #[serde(default, deserialize_with = "lenient")]
    pub subject_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub prereq_seq_id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_title: String,
    #[serde(default, deserialize_with = "lenient")]
    pub course_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub grade_seq_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub r#type: String,
}

impl From<PrerequisiteRow> for Prerequisite {
    fn from(row: PrerequisiteRow) -> Self {
        Prerequisite {
            order: row.prereq_seq_id,
            course: CourseId::new(row.subject_code.trim(), row.course_code.trim()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PreAuthResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub display: String,
    #[serde(default, deserialize_with = "lenient")]
    pub list_data: Vec<CourseRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EmailResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub success: String,
    #[serde(default, deserialize_with = "lenient")]
    pub mail_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EnrollDatesResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PassMessageResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub appt_timer: String,
    #[serde(default, deserialize_with = "lenient")]
    pub college_code: String,
    #[serde(default, deserialize_with = "lenient")]
    pub display: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_begin_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_begin_hour: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_begin_min: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_end_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_end_hour: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_end_min: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_begin_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_begin_hour: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_begin_min: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_end_date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_end_hour: String,
    #[serde(default, deserialize_with = "lenient")]
    pub second_end_min: String,
}

impl From<PassMessageResponse> for PassMessage {
    fn from(r: PassMessageResponse) -> Self {
        PassMessage {
            first_pass_begin: parse_backend_time(
                &r.first_begin_date,
                &r.first_begin_hour,
                &r.first_begin_min,
            ),
            first_pass_end: parse_backend_time(
                &r.first_end_date,
                &r.first_end_hour,
                &r.first_end_min,
            ),
            second_pass_begin: parse_backend_time(
                &r.second_begin_date,
                &r.second_begin_hour,
                &r.second_begin_min,
            ),
            second_pass_end: parse_backend_time(
                &r.second_end_date,
                &r.second_end_hour,
                &r.second_end_min,
            ),
            appointment_timer: r.appt_timer,
            college_code: r.college_code,
            display: r.display,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CatalogResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub catalog_data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RestrictionRow {
    #[serde(default, deserialize_with = "lenient")]
    pub crse_regis_type_cd: String,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_regis_flag: String,
    #[serde(default, deserialize_with = "lenient")]
    pub crse_regis_code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CourseTextRow {
    #[serde(default, deserialize_with = "lenient")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient")]
    pub subjcrse: String,
}

impl From<CourseTextRow> for CourseText {
    fn from(row: CourseTextRow) -> Self {
        CourseText {
            text: row.text,
            course_id: row.subjcrse,
        }
    }
}

/// Combine a backend date with optional hour and minute offsets
///
/// Empty or unparsable dates yield `None`; unparsable offsets are ignored.
pub(crate) fn parse_backend_time(date: &str, hour: &str, minute: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }

    let base = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date, format).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%m/%d/%Y"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(date, format).ok())
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        })?;

    // Offsets that do not parse or would overflow the date are skipped
    let apply = |time: NaiveDateTime, text: &str, seconds_per_unit: f64| {
        text.trim()
            .parse::<f64>()
            .ok()
            .and_then(|value| TimeDelta::try_seconds((value * seconds_per_unit) as i64))
            .and_then(|offset| time.checked_add_signed(offset))
            .unwrap_or(time)
    };

    Some(apply(apply(base, hour, 3600.0), minute, 60.0))
}
