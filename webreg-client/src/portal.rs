//! Session orchestration: credentials, portal landing page, and the backend client

use crate::client::{EnrollOutcome, WebRegClient};
use crate::cookies::{self, CookieJar, CookieSnapshot, TrustedDomains};
use crate::error::{Error, Result};
use crate::models::{
    Course, CourseId, EnrollWindow, PassMessage, Prerequisite, Profile, Subject, Term,
};
use crate::parser::{DocumentParser, PortalPage};
use crate::refresher::SessionRefresher;
use crate::sso::{LoginOutcome, SsoProvider};
use reqwest::Url;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_PORTAL_URL: &str = "http://mytritonlink.ucsd.edu";
pub const DEFAULT_BACKEND_URL: &str = "https://act.ucsd.edu";
pub const DEFAULT_SSO_METHOD: &str = "urn:mace:ucsd.edu:sso:studentsso";

/// Hosts and identifiers of the deployment being talked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    /// Portal landing page; also where the SSO redirect chain starts
    pub portal_url: Url,
    /// Base URL of the backend's JSON endpoints
    pub backend_url: Url,
    /// Authentication method identifier sent to the identity provider
    pub sso_method: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            portal_url: Url::parse(DEFAULT_PORTAL_URL).expect("default portal URL is valid"),
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            sso_method: DEFAULT_SSO_METHOD.to_string(),
        }
    }
}

impl PortalConfig {
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::default()
    }

    /// Backend and portal hosts, whose cookies make up the session
    pub fn trusted_domains(&self) -> TrustedDomains {
        TrustedDomains::new(
            self.backend_url.host_str().unwrap_or_default(),
            self.portal_url.host_str().unwrap_or_default(),
        )
    }
}

/// Builder for [`PortalConfig`], starting from the production defaults
#[derive(Debug, Default)]
pub struct PortalConfigBuilder {
    config: PortalConfig,
}

impl PortalConfigBuilder {
    pub fn portal_url(mut self, url: Url) -> Self {
        self.config.portal_url = url;
        self
    }

    pub fn backend_url(mut self, url: Url) -> Self {
        self.config.backend_url = url;
        self
    }

    pub fn sso_method(mut self, method: impl Into<String>) -> Self {
        self.config.sso_method = method.into();
        self
    }

    pub fn build(self) -> PortalConfig {
        self.config
    }
}

/// Progress of a portal session; each step unlocks more operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// No cookies yet
    Uninitialized,
    /// Cookies loaded from a login or a persisted snapshot
    CredentialsLoaded,
    /// Portal landing page scraped
    PortalInitialized,
    /// A term was selected on the backend
    TermSelected,
}

/// One account's session with the portal and its backend
///
/// All HTTP traffic of a portal, including its lazily created [`WebRegClient`], shares
/// one [`CookieJar`]. Operations check the [`SessionState`] first and fail with
/// [`Error::InvalidState`] instead of sending a request the backend would reject.
///
/// # Example
///
/// ```no_run
/// use webreg_client::{Credentials, Portal, PortalConfig, SsoProvider};
/// use zeroize::Zeroizing;
///
/// # async fn run() -> Result<(), webreg_client::Error> {
/// let config = PortalConfig::default();
/// let provider = SsoProvider::new(
///     Credentials::new("jdoe", Zeroizing::new("hunter2".to_string())),
///     &config,
/// );
///
/// let mut portal = Portal::new(config)?;
/// portal.login(&provider).await?;
/// portal.initialize().await?;
/// println!("Logged in as {}", portal.name()?);
///
/// let terms = portal.get_terms().await?;
/// portal.set_term(&terms[0]).await?;
/// let subjects = portal.search_subjects().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Portal {
    config: PortalConfig,
    jar: Arc<CookieJar>,
    http: reqwest::Client,
    parser: DocumentParser,
    page: Option<PortalPage>,
    webreg: Option<WebRegClient>,
    state: SessionState,
}

impl Portal {
    /// Create a portal session with no credentials
    pub fn new(config: PortalConfig) -> Result<Self> {
        let jar = Arc::new(CookieJar::new());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| Error::ClientInit(e.to_string()))?;

        Ok(Self {
            config,
            jar,
            http,
            parser: DocumentParser::new(),
            page: None,
            webreg: None,
            state: SessionState::Uninitialized,
        })
    }

    /// Create a portal session from previously exported cookies, skipping SSO
    pub fn from_snapshot(config: PortalConfig, snapshot: &CookieSnapshot) -> Result<Self> {
        let mut portal = Self::new(config)?;
        portal.load_credentials(snapshot);
        Ok(portal)
    }

    /// Create a portal session from a persisted snapshot file
    pub async fn from_snapshot_file(config: PortalConfig, path: &Path) -> Result<Self> {
        let snapshot = CookieSnapshot::load(path).await?;
        tracing::info!(
            path = %path.display(),
            cookies = snapshot.len(),
            "Loaded persisted session"
        );
        Self::from_snapshot(config, &snapshot)
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    /// Cookies of the trusted hosts, in the persisted snapshot format
    pub fn snapshot(&self) -> CookieSnapshot {
        cookies::collect(&self.jar, &self.config.trusted_domains())
    }

    /// Log in through `provider` and load the resulting cookies
    pub async fn login(&mut self, provider: &SsoProvider) -> Result<LoginOutcome> {
        let outcome = provider.login().await?;
        self.load_credentials(&provider.credentials());
        Ok(outcome)
    }

    fn load_credentials(&mut self, snapshot: &CookieSnapshot) {
        cookies::merge(&self.jar, snapshot);
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::CredentialsLoaded;
        }
    }

    /// Scrape the portal landing page; allowed exactly once per session
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state == SessionState::Uninitialized {
            return Err(Error::InvalidState(
                "cannot initialize the portal before credentials are loaded".to_string(),
            ));
        }
        if self.page.is_some() {
            return Err(Error::InvalidState("portal is already initialized".to_string()));
        }

        tracing::debug!(url = %self.config.portal_url, "Loading portal landing page");
        let response = self.http.get(self.config.portal_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidStatus { status });
        }
        let html = response.text().await?;
        let page = self.parser.parse_portal_page(&html)?;

        tracing::info!(name = %page.profile.name, "Portal initialized");
        self.page = Some(page);
        // A term selected before the page was scraped stays selected
        self.state = self.state.max(SessionState::PortalInitialized);
        Ok(())
    }

    /// Profile scraped by [`initialize`](Self::initialize)
    pub fn profile(&self) -> Result<&Profile> {
        self.page
            .as_ref()
            .map(|page| &page.profile)
            .ok_or_else(|| Error::InvalidState("portal is not initialized".to_string()))
    }

    pub fn name(&self) -> Result<&str> {
        Ok(&self.profile()?.name)
    }

    pub fn college(&self) -> Result<&str> {
        Ok(&self.profile()?.college)
    }

    pub fn major(&self) -> Result<&str> {
        Ok(&self.profile()?.major)
    }

    pub fn level(&self) -> Result<&str> {
        Ok(&self.profile()?.level)
    }

    pub fn balance(&self) -> Result<&str> {
        Ok(&self.profile()?.balance)
    }

    /// Backend client bound to this session's cookie jar, created on first use
    pub fn webreg(&mut self) -> Result<&mut WebRegClient> {
        if self.state == SessionState::Uninitialized {
            return Err(Error::InvalidState(
                "the backend client needs credentials; log in or load a snapshot first".to_string(),
            ));
        }

        match &mut self.webreg {
            Some(client) => Ok(client),
            slot @ None => {
                let client = WebRegClient::builder()
                    .base_url(self.config.backend_url.clone())?
                    .cookie_jar(Arc::clone(&self.jar))
                    .build()?;
                Ok(slot.insert(client))
            }
        }
    }

    /// Term selected with [`set_term`](Self::set_term)
    pub fn selected_term(&self) -> Option<&Term> {
        self.webreg.as_ref().and_then(WebRegClient::selected_term)
    }

    pub async fn get_terms(&mut self) -> Result<Vec<Term>> {
        self.webreg()?.get_terms().await
    }

    /// Select the term the enrollment operations act on
    pub async fn set_term(&mut self, term: &Term) -> Result<()> {
        let result = self.webreg()?.set_term(term).await;
        self.state = match (&result, self.page.is_some()) {
            (Ok(()), _) => SessionState::TermSelected,
            (Err(_), true) => SessionState::PortalInitialized,
            (Err(_), false) => SessionState::CredentialsLoaded,
        };
        result
    }

    /// Probe whether the session is accepted for `term` without selecting it
    pub async fn verify_term(&mut self, term: &Term) -> Result<bool> {
        let eligibility = self.webreg()?.check_eligibility(term, false).await?;
        Ok(eligibility.is_eligible())
    }

    /// Selected term, or an error naming the operation that needed it
    fn require_term(&self, operation: &str) -> Result<Term> {
        match (self.state, self.selected_term()) {
            (SessionState::TermSelected, Some(term)) => Ok(term.clone()),
            _ => Err(Error::InvalidState(format!("{operation} requires a selected term"))),
        }
    }

    pub async fn search_subjects(&mut self) -> Result<Vec<Subject>> {
        let term = self.require_term("search_subjects")?;
        self.webreg()?.search_subjects(&term).await
    }

    pub async fn search_courses(&mut self, subject: &Subject) -> Result<Vec<CourseId>> {
        let term = self.require_term("search_courses")?;
        self.webreg()?.search_courses(&term, subject).await
    }

    pub async fn get_prerequisites(&mut self, course: &CourseId) -> Result<Vec<Prerequisite>> {
        let term = self.require_term("get_prerequisites")?;
        self.webreg()?.get_prerequisites(&term, course).await
    }

    pub async fn add_enroll(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.require_term("add_enroll")?;
        self.webreg()?.add_enroll(course).await
    }

    pub async fn drop_enroll(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.require_term("drop_enroll")?;
        self.webreg()?.drop_enroll(course).await
    }

    pub async fn edit_enroll(&mut self, course: &Course) -> Result<Course> {
        self.require_term("edit_enroll")?;
        self.webreg()?.edit_enroll(course).await
    }

    pub async fn add_wait(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.require_term("add_wait")?;
        self.webreg()?.add_wait(course).await
    }

    pub async fn drop_wait(&mut self, course: &Course) -> Result<EnrollOutcome> {
        self.require_term("drop_wait")?;
        self.webreg()?.drop_wait(course).await
    }

    pub async fn edit_wait(&mut self, course: &Course) -> Result<Course> {
        self.require_term("edit_wait")?;
        self.webreg()?.edit_wait(course).await
    }

    pub async fn send_email(&mut self, content: &str) -> Result<bool> {
        let term = self.require_term("send_email")?;
        self.webreg()?.send_email(&term, content).await
    }

    pub async fn get_enroll_window(&mut self) -> Result<EnrollWindow> {
        let term = self.require_term("get_enroll_window")?;
        self.webreg()?.get_enroll_add_dates(&term).await
    }

    pub async fn get_pass_message(&mut self) -> Result<PassMessage> {
        let term = self.require_term("get_pass_message")?;
        self.webreg()?.get_pass_message(&term).await
    }

    /// Run the browser refresher against this session's cookies
    ///
    /// The selected term is kept: the refresher only adds cookies.
    pub async fn refresh_session(
        &mut self,
        refresher: &SessionRefresher,
    ) -> Result<CookieSnapshot> {
        if self.state == SessionState::Uninitialized {
            return Err(Error::InvalidState(
                "cannot refresh a session without credentials".to_string(),
            ));
        }
        refresher.refresh(&self.jar).await
    }

    /// Follow the scraped logout link and forget every cookie
    pub async fn logout(&mut self) -> Result<()> {
        let logout_path = self
            .page
            .as_ref()
            .map(|page| page.logout_path.clone())
            .ok_or_else(|| {
                Error::InvalidState("cannot log out before the portal is initialized".to_string())
            })?;

        let url = self
            .config
            .backend_url
            .join(&logout_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", logout_path, e)))?;
        tracing::debug!(url = %url, "Logging out");
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Logout returned a failure status");
        }

        self.jar.clear();
        self.page = None;
        self.webreg = None;
        self.state = SessionState::Uninitialized;
        tracing::info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::cookies::CookieRecord;
    use crate::models::GradingOption;
    use mockito::Matcher;

    const PORTAL_HTML: &str = r##"<html><body>
        <div id="tdr_login_content"><a href="/security/student/logout">Log out</a></div>
        <div id="my_tritonlink_sidebar">
            <h2>Jane Doe</h2>
            <p>Student</p>
            <p><a href="#">Sixth</a></p>
            <p><a href="#">Computer Science</a></p>
            <p><b>Undergraduate</b></p>
        </div>
        <div id="account_balance"><div class="cs_box_amount"><a href="#"><strong>$12.50</strong></a></div></div>
        </body></html>"##;

    fn config_for(server: &mockito::Server) -> PortalConfig {
        let url = Url::parse(&server.url()).unwrap();
        PortalConfig::builder()
            .portal_url(url.join("/portal").unwrap())
            .backend_url(url)
            .build()
    }

    fn session_snapshot(server: &mockito::Server) -> CookieSnapshot {
        let host = Url::parse(&server.url()).unwrap().host_str().unwrap().to_string();
        CookieSnapshot::from_iter([CookieRecord {
            name: "jlinksessionidx".to_string(),
            value: "abc".to_string(),
            domain: host,
            path: "/".to_string(),
            httponly: true,
            secure: false,
        }])
    }

    fn term() -> Term {
        Term {
            description: "Summer Session I 2018".to_string(),
            code: "S118".to_string(),
            sequence_id: 3180,
        }
    }

    async fn mock_term_selection(server: &mut mockito::Server) {
        server.mock("POST", api::WR_LOGGER.path).with_status(200).create_async().await;
        server
            .mock("GET", api::CHECK_ELIGIBILITY.path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"OPSIV":"SUCCESS","OPS":"SUCCESS"}"#)
            .create_async()
            .await;
        server
            .mock("GET", api::GET_STATUS_START.path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_initialize_scrapes_profile_once() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/portal")
            .match_header("cookie", "jlinksessionidx=abc")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PORTAL_HTML)
            .expect(1)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        assert_eq!(portal.state(), SessionState::CredentialsLoaded);
        assert!(matches!(portal.name(), Err(Error::InvalidState(_))));

        portal.initialize().await.unwrap();
        assert_eq!(portal.state(), SessionState::PortalInitialized);
        assert_eq!(portal.name().unwrap(), "Jane Doe");
        assert_eq!(portal.college().unwrap(), "Sixth");
        assert_eq!(portal.major().unwrap(), "Computer Science");
        assert_eq!(portal.level().unwrap(), "Undergraduate");
        assert_eq!(portal.balance().unwrap(), "$12.50");

        let again = portal.initialize().await;
        assert!(matches!(again, Err(Error::InvalidState(_))));
        page.assert_async().await;
    }

    #[tokio::test]
    async fn test_uninitialized_portal_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let page = server.mock("GET", "/portal").expect(0).create_async().await;

        let mut portal = Portal::new(config_for(&server)).unwrap();
        assert!(matches!(portal.initialize().await, Err(Error::InvalidState(_))));
        assert!(matches!(portal.webreg(), Err(Error::InvalidState(_))));
        assert!(matches!(portal.logout().await, Err(Error::InvalidState(_))));
        page.assert_async().await;
    }

    #[tokio::test]
    async fn test_unavailable_portal_keeps_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/portal")
            .with_status(200)
            .with_body(
                r#"<div id="class_schedule"><div><h1><b><font>Down for maintenance</font></b></h1></div></div>"#,
            )
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        let result = portal.initialize().await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
        assert_eq!(portal.state(), SessionState::CredentialsLoaded);
    }

    #[tokio::test]
    async fn test_term_operations_require_set_term() {
        let mut server = mockito::Server::new_async().await;
        let subjects = server
            .mock("GET", api::SEARCH_LOAD_SUBJECT.path)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        assert!(matches!(portal.search_subjects().await, Err(Error::InvalidState(_))));
        assert!(matches!(portal.get_pass_message().await, Err(Error::InvalidState(_))));
        subjects.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_term_then_enroll() {
        let mut server = mockito::Server::new_async().await;
        mock_term_selection(&mut server).await;
        server
            .mock("GET", api::SEARCH_LOAD_SUBJECT.path)
            .match_query(Matcher::UrlEncoded("termcode".into(), "S118".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"SUBJECT_CODE":"MAE ","LONG_DESC":"Mechanical & Aerospace Engr"}]"#)
            .create_async()
            .await;
        let enroll = server
            .mock("POST", api::ADD_ENROLL.path)
            .match_header("cookie", "jlinksessionidx=abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"OPSIV":"SUCCESS","OPS":"SUCCESS"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        portal.set_term(&term()).await.unwrap();
        assert_eq!(portal.state(), SessionState::TermSelected);
        assert_eq!(portal.selected_term(), Some(&term()));

        let subjects = portal.search_subjects().await.unwrap();
        assert_eq!(subjects[0].code, "MAE");

        let course = Course {
            id: CourseId::new("MAE", "  8").with_section(41234),
            grading_option: GradingOption::PassNoPass,
            unit: 4.0,
            term_code: "S118".to_string(),
        };
        assert!(portal.add_enroll(&course).await.unwrap().success);
        enroll.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_set_term_drops_back() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", api::WR_LOGGER.path).with_status(200).create_async().await;
        server
            .mock("GET", api::CHECK_ELIGIBILITY.path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>Sign in</html>")
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        let result = portal.set_term(&term()).await;
        assert!(result.as_ref().is_err_and(Error::is_session_expired));
        assert_eq!(portal.state(), SessionState::CredentialsLoaded);
    }

    #[tokio::test]
    async fn test_initialize_after_set_term() {
        let mut server = mockito::Server::new_async().await;
        mock_term_selection(&mut server).await;
        let page = server
            .mock("GET", "/portal")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PORTAL_HTML)
            .expect(1)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        portal.set_term(&term()).await.unwrap();
        assert!(matches!(portal.profile(), Err(Error::InvalidState(_))));

        portal.initialize().await.unwrap();
        assert_eq!(portal.state(), SessionState::TermSelected);
        assert_eq!(portal.name().unwrap(), "Jane Doe");
        assert_eq!(portal.selected_term(), Some(&term()));

        let again = portal.initialize().await;
        assert!(matches!(again, Err(Error::InvalidState(_))));
        page.assert_async().await;
    }

    #[tokio::test]
    async fn test_verify_term() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", api::CHECK_ELIGIBILITY.path)
            .match_query(Matcher::UrlEncoded("logged".into(), "False".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"OPSIV":"SUCCESS","OPS":"FAIL"}"#)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        assert!(portal.verify_term(&term()).await.unwrap());
        assert_eq!(portal.state(), SessionState::CredentialsLoaded);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/portal")
            .with_status(200)
            .with_body(PORTAL_HTML)
            .create_async()
            .await;
        let logout = server
            .mock("GET", "/security/student/logout")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut portal =
            Portal::from_snapshot(config_for(&server), &session_snapshot(&server)).unwrap();
        portal.initialize().await.unwrap();
        portal.logout().await.unwrap();

        assert_eq!(portal.state(), SessionState::Uninitialized);
        assert!(portal.cookie_jar().is_empty());
        assert!(matches!(portal.profile(), Err(Error::InvalidState(_))));
        logout.assert_async().await;
    }

    #[tokio::test]
    async fn test_from_snapshot_file() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        session_snapshot(&server).save(&path).await.unwrap();

        let portal = Portal::from_snapshot_file(config_for(&server), &path).await.unwrap();
        assert_eq!(portal.state(), SessionState::CredentialsLoaded);
        assert_eq!(portal.snapshot(), session_snapshot(&server));

        let missing =
            Portal::from_snapshot_file(config_for(&server), &dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_default_config_trusted_hosts() {
        let trusted = PortalConfig::default().trusted_domains();
        assert_eq!(trusted.hosts(), ["act.ucsd.edu", "mytritonlink.ucsd.edu"]);
    }
}
