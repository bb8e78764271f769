//! REST client for the WebReg backend

use crate::api::{self, EditEnvelope, EligibilityResponse, Endpoint, Envelope, StatusStartRow};
use crate::cookies::{self, CookieJar, CookieSnapshot};
use crate::error::{Error, Result};
use crate::models::{
    Course, CourseId, CourseSectionInfo, CourseText, EnrollWindow, PassMessage, Prerequisite,
    Subject, Term,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;

const MEDIA_TYPE_JSON: &str = "application/json";
const MEDIA_TYPE_HTML: &str = "text/html";

/// Result of an add or drop request
///
/// `success` is only true when both envelope indicators report success. The backend
/// answers HTTP 200 for rejected requests as well, so callers must check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub success: bool,
    /// Warning text attached by the backend (often the reason for a rejection)
    pub warning: String,
}

impl From<Envelope> for EnrollOutcome {
    fn from(envelope: Envelope) -> Self {
        Self {
            success: envelope.is_success(),
            warning: envelope.warning,
        }
    }
}

type Params = Vec<(&'static str, String)>;

/// Client for the backend's internal JSON endpoints
///
/// Every response passes through status and content-type validation before it is
/// decoded. A `text/html` answer where JSON was expected is how the backend reports
/// an expired session, and surfaces as [`Error::SessionExpired`].
///
/// Endpoints under `secure/` are gated on [`set_term`](Self::set_term): calling them
/// for a term that has not been selected fails without touching the network.
/// Enrollment-changing calls take `&mut self`, so at most one of them can be in
/// flight per session.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use webreg_client::{CookieJar, WebRegClient};
///
/// # async fn run() -> Result<(), webreg_client::Error> {
/// let jar = Arc::new(CookieJar::new());
/// let mut client = WebRegClient::builder().cookie_jar(jar).build()?;
///
/// let terms = client.get_terms().await?;
/// let term = &terms[0];
/// client.set_term(term).await?;
/// for subject in client.search_subjects(term).await? {
///     println!("{} {}", subject.code, subject.description);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WebRegClient {
    http: reqwest::Client,
    base_url: Url,
    jar: Arc<CookieJar>,
    term: Option<Term>,
}

impl WebRegClient {
    /// Create a builder for configuring the client
    pub fn builder() -> WebRegClientBuilder {
        WebRegClientBuilder::new()
    }

    /// The cookie jar this client reads and writes
    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    /// Term selected by the last successful [`set_term`](Self::set_term)
    pub fn selected_term(&self) -> Option<&Term> {
        self.term.as_ref()
    }

    /// Add credentials obtained elsewhere (SSO login, refresher) to the shared jar
    pub fn update_credentials(&self, snapshot: &CookieSnapshot) {
        cookies::merge(&self.jar, snapshot);
    }

    /// Select the term that subsequent `secure/` calls operate on
    ///
    /// Sends the start-page beacon, checks eligibility and then loads the status
    /// start for the term, in that order. On any failure no term is selected.
    pub async fn set_term(&mut self, term: &Term) -> Result<()> {
        self.term = None;

        self.wr_logger().await?;

        let eligibility = self.check_eligibility(term, true).await?;
        if !eligibility.is_eligible() {
            let Envelope { opsiv, ops, warning } = eligibility.envelope;
            return Err(Error::Rejected { opsiv, ops, warning });
        }

        self.get_status_start(term).await?;

        tracing::info!(term = %term.code, "Term selected");
        self.term = Some(term.clone());
        Ok(())
    }

    /// List the terms currently offered
    pub async fn get_terms(&self) -> Result<Vec<Term>> {
        self.get_json(api::GET_TERM, None, Vec::new()).await
    }

    /// Check whether the session may operate on `term`
    pub async fn check_eligibility(
        &self,
        term: &Term,
        logged: bool,
    ) -> Result<EligibilityResponse> {
        let logged = if logged { "True" } else { "False" };
        self.get_json(
            api::CHECK_ELIGIBILITY,
            None,
            vec![
                ("termcode", term.code.clone()),
                ("seqid", term.sequence_id.to_string()),
                ("logged", logged.to_string()),
            ],
        )
        .await
    }

    /// Load the registration status rows for `term`
    pub async fn get_status_start(&self, term: &Term) -> Result<Vec<StatusStartRow>> {
        self.get_json(
            api::GET_STATUS_START,
            None,
            vec![
                ("seqid", term.sequence_id.to_string()),
                ("termcode", term.code.clone()),
            ],
        )
        .await
    }

    /// Send the "start page" beacon the web UI emits when it loads
    pub async fn wr_logger(&self) -> Result<()> {
        let url = self.endpoint_url(api::WR_LOGGER)?;
        tracing::debug!(endpoint = api::WR_LOGGER.path, "POST");
        let response = self
            .http
            .post(url)
            .form(&[
                ("action", "START PAGE"),
                ("crsecode", "N/A"),
                ("subjcode", "N/A"),
                ("termcode", "N/A"),
                ("result", ""),
                ("sectnum", ""),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidStatus {
                status: response.status(),
            });
        }
        Ok(())
    }

    /// List the subjects offered in `term`, with codes trimmed
    pub async fn search_subjects(&self, term: &Term) -> Result<Vec<Subject>> {
        let mut subjects: Vec<Subject> = self
            .get_json(
                api::SEARCH_LOAD_SUBJECT,
                Some(&term.code),
                vec![("termcode", term.code.clone())],
            )
            .await?;
        for subject in &mut subjects {
            subject.code = subject.code.trim().to_string();
        }
        Ok(subjects)
    }

    /// List the courses of `subject` in `term`
    ///
    /// Course codes are returned exactly as the backend sends them, including
    /// padding: `search_group_data` only recognizes the padded form.
    pub async fn search_courses(&self, term: &Term, subject: &Subject) -> Result<Vec<CourseId>> {
        let rows: Vec<api::CourseRow> = self
            .get_json(
                api::SEARCH_GET_CRSE_LIST,
                Some(&term.code),
                vec![
                    ("termcode", term.code.clone()),
                    ("subjlist", subject.code.clone()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| CourseId::new(subject.code.clone(), row.crse_code))
            .collect())
    }

    /// Sections the student is enrolled or waitlisted in for `term`
    pub async fn get_class(&self, term: &Term) -> Result<Vec<CourseSectionInfo>> {
        self.get_json(
            api::GET_CLASS,
            Some(&term.code),
            vec![
                ("termcode", term.code.clone()),
                ("schedname", String::new()),
                ("final", String::new()),
                ("sectnum", String::new()),
            ],
        )
        .await
    }

    pub async fn get_prerequisites(
        &self,
        term: &Term,
        course: &CourseId,
    ) -> Result<Vec<Prerequisite>> {
        let rows: Vec<api::PrerequisiteRow> = self
            .get_json(
                api::GET_PREREQUISITES,
                Some(&term.code),
                course_params(term, course),
            )
            .await?;
        Ok(rows.into_iter().map(Prerequisite::from).collect())
    }

    /// Courses the student holds a pre-authorization for
    pub async fn get_preauth_info(&self, term: &Term) -> Result<Vec<CourseId>> {
        let response: api::PreAuthResponse = self
            .get_json(
                api::GET_PREAUTH_INFO,
                Some(&term.code),
                vec![("termcode", term.code.clone())],
            )
            .await?;
        Ok(response
            .list_data
            .into_iter()
            .map(|row| CourseId::new(row.subj_code.trim(), row.crse_code))
            .collect())
    }

    /// Enroll in a section
    pub async fn add_enroll(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.submit(api::ADD_ENROLL, course, add_params(course)).await
    }

    /// Drop an enrolled section
    pub async fn drop_enroll(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.submit(api::DROP_ENROLL, course, section_params(course)).await
    }

    /// Prepare an enrollment and return the course with the section's default units
    pub async fn edit_enroll(&mut self, course: &Course) -> Result<Course> {
        self.edit(api::EDIT_ENROLL, course).await
    }

    /// Join the waitlist of a section
    pub async fn add_wait(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.submit(api::ADD_WAIT, course, add_params(course)).await
    }

    /// Leave the waitlist of a section
    pub async fn drop_wait(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.submit(api::DROP_WAIT, course, section_params(course)).await
    }

    /// Prepare a waitlist request and return the course with the section's default units
    pub async fn edit_wait(&mut self, course: &Course) -> Result<Course> {
        self.edit(api::EDIT_WAIT, course).await
    }

    /// Ask the backend to mail the student; true when the backend confirms
    pub async fn send_email(&self, term: &Term, content: &str) -> Result<bool> {
        let response: api::EmailResponse = self
            .post_json(
                api::SEND_EMAIL,
                Some(&term.code),
                vec![
                    ("actionevent", content.to_string()),
                    ("termcode", term.code.clone()),
                ],
            )
            .await?;
        Ok(response.success == "YES")
    }

    /// Window during which classes can be added in `term`
    pub async fn get_enroll_add_dates(&self, term: &Term) -> Result<EnrollWindow> {
        let response: api::EnrollDatesResponse = self
            .get_json(
                api::GET_ENROLL_ADD_DATES,
                Some(&term.code),
                vec![("termcode", term.code.clone())],
            )
            .await?;
        Ok(EnrollWindow {
            start: api::parse_backend_time(&response.start_date, "", ""),
            end: api::parse_backend_time(&response.end_date, "", ""),
        })
    }

    /// Enrollment pass appointments for `term`
    pub async fn get_pass_message(&self, term: &Term) -> Result<PassMessage> {
        let response: api::PassMessageResponse = self
            .get_json(
                api::GET_MSG_PASS,
                Some(&term.code),
                vec![("termcode", term.code.clone())],
            )
            .await?;
        Ok(PassMessage::from(response))
    }

    /// Catalog description of a course
    pub async fn search_catalog(&self, term: &Term, course: &CourseId) -> Result<String> {
        let response: api::CatalogResponse = self
            .get_json(
                api::SEARCH_GET_CATALOG,
                Some(&term.code),
                course_params(term, course),
            )
            .await?;
        Ok(response.catalog_data)
    }

    /// Registration restriction codes of a course
    pub async fn search_restriction(&self, term: &Term, course: &CourseId) -> Result<Vec<String>> {
        let rows: Vec<api::RestrictionRow> = self
            .get_json(
                api::SEARCH_GET_RESTRICTION,
                Some(&term.code),
                course_params(term, course),
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.crse_regis_code).collect())
    }

    /// Notes attached to sections; the body format is undocumented and returned raw
    pub async fn search_section_text(&self, term: &Term, sections: &[u32]) -> Result<String> {
        let list = sections
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(":");
        self.get_text(
            api::SEARCH_GET_SECTION_TEXT,
            Some(&term.code),
            vec![("sectnumlist", list), ("termcode", term.code.clone())],
        )
        .await
    }

    /// Notes attached to the courses of a subject
    pub async fn search_course_text(
        &self,
        term: &Term,
        subject: &Subject,
    ) -> Result<Vec<CourseText>> {
        let rows: Vec<api::CourseTextRow> = self
            .get_json(
                api::SEARCH_GET_CRSE_TEXT,
                Some(&term.code),
                vec![
                    ("subjlist", subject.code.clone()),
                    ("termcode", term.code.clone()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(CourseText::from).collect())
    }

    /// All sections of a course
    pub async fn search_group_data(
        &self,
        term: &Term,
        course: &CourseId,
    ) -> Result<Vec<CourseSectionInfo>> {
        self.get_json(
            api::SEARCH_LOAD_GROUP_DATA,
            Some(&term.code),
            course_params(term, course),
        )
        .await
    }

    async fn submit(
        &mut self,
        endpoint: Endpoint,
        course: &Course,
        params: Params,
    ) -> Result<EnrollOutcome> {
        let envelope: Envelope = self
            .post_json(endpoint, Some(&course.term_code), params)
            .await?;
        if !envelope.is_success() {
            tracing::warn!(
                endpoint = endpoint.path,
                course = %course.id,
                opsiv = %envelope.opsiv,
                ops = %envelope.ops,
                warning = %envelope.warning,
                "Backend rejected request"
            );
        }
        Ok(EnrollOutcome::from(envelope))
    }

    async fn edit(&mut self, endpoint: Endpoint, course: &Course) -> Result<Course> {
        let response: EditEnvelope = self
            .post_json(endpoint, Some(&course.term_code), section_params(course))
            .await?;
        if !response.envelope.is_success() {
            let Envelope { opsiv, ops, warning } = response.envelope;
            return Err(Error::Rejected { opsiv, ops, warning });
        }
        Ok(Course {
            unit: response.unit_default,
            ..course.clone()
        })
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url> {
        self.base_url
            .join(endpoint.path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", endpoint.path, e)))
    }

    /// Fail fast when a term-scoped endpoint is called outside its selected term
    fn require_term(&self, endpoint: Endpoint, term_code: Option<&str>) -> Result<()> {
        if !endpoint.term_scoped {
            return Ok(());
        }
        match (&self.term, term_code) {
            (Some(selected), Some(code)) if selected.code == code => Ok(()),
            (Some(selected), requested) => Err(Error::InvalidState(format!(
                "{} called for term {:?} while term {} is selected",
                endpoint.path,
                requested.unwrap_or_default(),
                selected.code
            ))),
            (None, _) => Err(Error::InvalidState(format!(
                "{} requires a selected term; call set_term first",
                endpoint.path
            ))),
        }
    }

    async fn get_text(
        &self,
        endpoint: Endpoint,
        term_code: Option<&str>,
        query: Params,
    ) -> Result<String> {
        self.require_term(endpoint, term_code)?;
        let url = self.endpoint_url(endpoint)?;
        tracing::debug!(endpoint = endpoint.path, "GET");
        let response = self.http.get(url).query(&query).send().await?;
        let response = validate_response(endpoint, response).await?;
        Ok(response.text().await?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        term_code: Option<&str>,
        query: Params,
    ) -> Result<T> {
        let body = self.get_text(endpoint, term_code, query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        term_code: Option<&str>,
        form: Params,
    ) -> Result<T> {
        self.require_term(endpoint, term_code)?;
        let url = self.endpoint_url(endpoint)?;
        tracing::debug!(endpoint = endpoint.path, "POST");
        let response = self.http.post(url).form(&form).send().await?;
        let response = validate_response(endpoint, response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn course_params(term: &Term, course: &CourseId) -> Params {
    vec![
        ("subjcode", course.subject.clone()),
        ("crsecode", course.code.clone()),
        ("termcode", term.code.clone()),
    ]
}

fn section_params(course: &Course) -> Params {
    vec![
        ("termcode", course.term_code.clone()),
        ("subjcode", course.id.subject.clone()),
        ("crsecode", course.id.code.clone()),
        ("section", course.id.section.to_string()),
    ]
}

fn add_params(course: &Course) -> Params {
    let mut params = section_params(course);
    params.push(("grade", course.grading_option.code().to_string()));
    params.push(("unit", format!("{:.2}", course.unit)));
    params
}

/// Media type of a response without parameters, lowercase; empty when absent
fn media_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classify a backend response before anything tries to decode it
async fn validate_response(
    endpoint: Endpoint,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();

    if status == StatusCode::BAD_REQUEST {
        return Err(Error::MalformedRequest {
            endpoint: endpoint.path,
        });
    }

    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(endpoint = endpoint.path, %status, body = %body, "Backend server error");
        return Err(Error::Server {
            endpoint: endpoint.path,
            status,
            body,
        });
    }

    if !status.is_success() {
        return Err(Error::InvalidStatus { status });
    }

    match media_type(&response).as_str() {
        MEDIA_TYPE_JSON => Ok(response),
        MEDIA_TYPE_HTML => {
            tracing::warn!(
                endpoint = endpoint.path,
                "Received HTML instead of JSON, session has expired"
            );
            Err(Error::SessionExpired {
                endpoint: endpoint.path,
            })
        }
        other => Err(Error::UnexpectedContentType {
            endpoint: endpoint.path,
            content_type: other.to_string(),
        }),
    }
}

/// Builder for configuring a [`WebRegClient`]
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use webreg_client::{CookieJar, WebRegClient};
///
/// # fn main() -> Result<(), webreg_client::Error> {
/// let client = WebRegClient::builder()
///     .base_url("http://localhost:1234")?
///     .cookie_jar(Arc::new(CookieJar::new()))
///     .client_builder(reqwest::Client::builder().timeout(Duration::from_secs(30)))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct WebRegClientBuilder {
    base_url: Option<Url>,
    client_builder: Option<reqwest::ClientBuilder>,
    jar: Option<Arc<CookieJar>>,
}

impl WebRegClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend base URL; parsed and validated immediately
    pub fn base_url(mut self, url: impl reqwest::IntoUrl) -> Result<Self> {
        self.base_url = Some(url.into_url()?);
        Ok(self)
    }

    /// Share an existing cookie jar; a fresh one is created otherwise
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Set a custom HTTP client builder (timeouts, proxies, ...)
    ///
    /// The cookie provider is always replaced with the client's jar.
    pub fn client_builder(mut self, builder: reqwest::ClientBuilder) -> Self {
        self.client_builder = Some(builder);
        self
    }

    pub fn build(self) -> Result<WebRegClient> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(crate::portal::DEFAULT_BACKEND_URL)
                .map_err(|e| Error::InvalidUrl(e.to_string()))?,
        };
        let jar = self.jar.unwrap_or_default();
        let builder = self
            .client_builder
            .unwrap_or_else(|| reqwest::Client::builder().use_rustls_tls());

        let http = builder
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| Error::ClientInit(e.to_string()))?;

        Ok(WebRegClient {
            http,
            base_url,
            jar,
            term: None,
        })
    }
}
