//! WebReg Client Library
//!
//! Talks to a university course-enrollment portal that has no public API: logs in
//! through the campus single sign-on, keeps the resulting session as a set of
//! cookies, and calls the internal JSON endpoints the enrollment web page uses.
//!
//! # Features
//!
//! - SAML single sign-on login with the password held in zeroizing memory
//! - One cookie jar shared by every HTTP client of a session
//! - Cookie snapshots persisted as JSON and exchanged with a headless browser
//! - Session refresh through a supervised browser subprocess with a timeout
//! - Response validation that tells expired sessions apart from real failures
//! - Secure TLS using rustls (no OpenSSL dependencies)
//! - Async API on tokio, well-typed errors using thiserror
//!
//! # Example
//!
//! ```no_run
//! use webreg_client::{
//!     Course, CourseId, Credentials, GradingOption, Portal, PortalConfig, SsoProvider,
//! };
//! use zeroize::Zeroizing;
//!
//! # async fn run() -> Result<(), webreg_client::Error> {
//! let config = PortalConfig::default();
//! let provider = SsoProvider::new(
//!     Credentials::new("jdoe", Zeroizing::new("hunter2".to_string())),
//!     &config,
//! );
//!
//! let mut portal = Portal::new(config)?;
//! portal.login(&provider).await?;
//! portal.initialize().await?;
//!
//! let terms = portal.get_terms().await?;
//! portal.set_term(&terms[0]).await?;
//!
//! let course = Course {
//!     id: CourseId::new("CSE", "100").with_section(123456),
//!     grading_option: GradingOption::Letter,
//!     unit: 4.0,
//!     term_code: terms[0].code.clone(),
//! };
//! let outcome = portal.add_enroll(&course).await?;
//! if !outcome.success {
//!     println!("Enrollment rejected: {}", outcome.warning);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
pub mod cookies;
mod error;
mod models;
mod parser;
mod portal;
mod refresher;
mod sso;

pub use client::{EnrollOutcome, WebRegClient, WebRegClientBuilder};
pub use cookies::{Cookie, CookieJar, CookieRecord, CookieSnapshot, TrustedDomains};
pub use error::{Error, Result};
pub use models::{
    Course, CourseId, CourseSectionInfo, CourseText, EnrollWindow, GradingOption, PassMessage,
    Prerequisite, Profile, Subject, Term,
};
pub use parser::{PortalPage, SamlForm};
pub use portal::{
    DEFAULT_BACKEND_URL, DEFAULT_PORTAL_URL, DEFAULT_SSO_METHOD, Portal, PortalConfig,
    PortalConfigBuilder, SessionState,
};
pub use refresher::{RefresherConfig, SessionRefresher};
pub use sso::{Credentials, LoginOutcome, SsoProvider};
