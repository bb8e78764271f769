//! Single sign-on login through the campus identity provider

use crate::cookies::{self, CookieJar, CookieSnapshot, TrustedDomains};
use crate::error::{Error, Result};
use crate::parser::DocumentParser;
use crate::portal::PortalConfig;
use reqwest::{StatusCode, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use zeroize::Zeroizing;

const USERNAME_FIELD: &str = "urn:mace:ucsd.edu:sso:username";
const PASSWORD_FIELD: &str = "urn:mace:ucsd.edu:sso:password";
const AUTH_METHOD_FIELD: &str = "urn:mace:ucsd.edu:sso:authmethod";

/// Username and password for the identity provider
///
/// The password is wiped from memory when the credentials are dropped.
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Zeroizing<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How far a completed login has been checked
///
/// The SAML consumer answering with a success status is the only signal the
/// handshake provides. Probe the session (for example with
/// [`Portal::verify_term`](crate::Portal::verify_term)) before relying on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoginOutcome {
    /// The SAML assertion was accepted with `status`; the session was not probed
    Unverified { status: StatusCode },
}

/// Drives the SAML redirect-and-post handshake for one account
///
/// Only one login may run at a time per provider; a second concurrent call fails
/// with [`Error::ConcurrentLogin`]. Cookies from a successful login are available
/// through [`credentials`](Self::credentials). A failed login leaves them empty.
#[derive(Debug)]
pub struct SsoProvider {
    credentials: Credentials,
    portal_url: Url,
    auth_method: String,
    trusted: TrustedDomains,
    parser: DocumentParser,
    pending: AtomicBool,
    collected: Mutex<CookieSnapshot>,
}

/// Clears the pending flag on every exit path of a login
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SsoProvider {
    pub fn new(credentials: Credentials, config: &PortalConfig) -> Self {
        Self {
            credentials,
            portal_url: config.portal_url.clone(),
            auth_method: config.sso_method.clone(),
            trusted: config.trusted_domains(),
            parser: DocumentParser::new(),
            pending: AtomicBool::new(false),
            collected: Mutex::new(CookieSnapshot::default()),
        }
    }

    /// Username this provider logs in as
    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Whether a login is currently running
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Cookies for the trusted domains from the last successful login
    pub fn credentials(&self) -> CookieSnapshot {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the login handshake
    pub async fn login(&self) -> Result<LoginOutcome> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ConcurrentLogin);
        }
        let _guard = PendingGuard(&self.pending);

        tracing::info!(user = %self.credentials.username, "Logging in through SSO");

        // Cookies only reach `collected` once the whole handshake succeeded
        let staging = Arc::new(CookieJar::new());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&staging))
            .build()
            .map_err(|e| Error::ClientInit(e.to_string()))?;

        let landing = http.get(self.portal_url.clone()).send().await?;
        let sso_url = landing.url().clone();
        tracing::debug!(endpoint = %sso_url, "Resolved SSO endpoint");

        let form = [
            ("initAuthMethod", self.auth_method.as_str()),
            (USERNAME_FIELD, self.credentials.username.as_str()),
            (PASSWORD_FIELD, self.credentials.password.as_str()),
            (AUTH_METHOD_FIELD, self.auth_method.as_str()),
            ("submit", "submit"),
        ];
        let response = http.post(sso_url.clone()).form(&form).send().await?;
        let body = Zeroizing::new(response.text().await?);

        let saml = self.parser.parse_saml_form(&body)?;
        let target = resolve_action(&sso_url, &saml.action)?;
        tracing::debug!(endpoint = %target, fields = saml.fields.len(), "Posting SAML assertion");

        let response = http.post(target).form(&saml.fields).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidStatus { status });
        }

        let snapshot = cookies::collect(&staging, &self.trusted);
        tracing::info!(cookies = snapshot.len(), "SSO login completed, session not yet verified");
        *self.collected.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;

        Ok(LoginOutcome::Unverified { status })
    }
}

/// Resolve a SAML form action against the origin of the SSO endpoint
fn resolve_action(sso_url: &Url, action: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(action) {
        return Ok(url);
    }

    let mut origin = sso_url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
        .join(action)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", action, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::DEFAULT_SSO_METHOD;
    use mockito::Matcher;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials::new("jdoe", Zeroizing::new("hunter2".to_string()))
    }

    fn config_for(server_url: &str) -> PortalConfig {
        let url = Url::parse(server_url).unwrap();
        PortalConfig::builder()
            .portal_url(url.join("/portal").unwrap())
            .backend_url(url)
            .build()
    }

    fn saml_page(action: &str, inputs: &str) -> String {
        format!(
            r#"<html><body onload="document.forms[0].submit()">
            <form action="{action}" method="post"><div>{inputs}</div></form>
            </body></html>"#
        )
    }

    #[tokio::test]
    async fn test_login_posts_credentials_and_assertion() {
        let mut server = mockito::Server::new_async().await;
        let host = Url::parse(&server.url()).unwrap().host_str().unwrap().to_string();

        server
            .mock("GET", "/portal")
            .with_status(302)
            .with_header("location", "/idp/login?service=portal")
            .create_async()
            .await;
        server
            .mock("GET", "/idp/login")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html><form></form></html>")
            .create_async()
            .await;
        let login = server
            .mock("POST", "/idp/login")
            .match_query(Matcher::UrlEncoded("service".into(), "portal".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded(USERNAME_FIELD.into(), "jdoe".into()),
                Matcher::UrlEncoded(PASSWORD_FIELD.into(), "hunter2".into()),
                Matcher::UrlEncoded("initAuthMethod".into(), DEFAULT_SSO_METHOD.into()),
                Matcher::UrlEncoded(AUTH_METHOD_FIELD.into(), DEFAULT_SSO_METHOD.into()),
            ]))
            .with_status(200)
            .with_body(saml_page(
                "/Shibboleth.sso/SAML2/POST",
                r#"<input type="hidden" name="RelayState" value="ss:mem:1"/>
                   <input type="hidden" name="SAMLResponse" value="PHNhbWw+"/>"#,
            ))
            .expect(1)
            .create_async()
            .await;
        let assertion = server
            .mock("POST", "/Shibboleth.sso/SAML2/POST")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("RelayState".into(), "ss:mem:1".into()),
                Matcher::UrlEncoded("SAMLResponse".into(), "PHNhbWw+".into()),
            ]))
            .with_status(200)
            .with_header("set-cookie", "_shibsession_1=abc; Path=/; HttpOnly")
            .expect(1)
            .create_async()
            .await;

        let provider = SsoProvider::new(credentials(), &config_for(&server.url()));
        let outcome = provider.login().await.unwrap();

        assert_eq!(outcome, LoginOutcome::Unverified { status: StatusCode::OK });
        login.assert_async().await;
        assertion.assert_async().await;

        let snapshot = provider.credentials();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records()[0].name, "_shibsession_1");
        assert_eq!(snapshot.records()[0].domain, host);
        assert!(!provider.is_pending());
    }

    #[tokio::test]
    async fn test_form_without_inputs_leaves_credentials_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/portal")
            .with_status(200)
            .with_header("set-cookie", "early=1; Path=/")
            .create_async()
            .await;
        server
            .mock("POST", "/portal")
            .with_status(200)
            .with_body(saml_page("/acs", ""))
            .create_async()
            .await;
        let assertion = server.mock("POST", "/acs").expect(0).create_async().await;

        let provider = SsoProvider::new(credentials(), &config_for(&server.url()));
        let result = provider.login().await;

        assert!(matches!(result, Err(Error::DocumentShape(_))));
        assert!(provider.credentials().is_empty());
        assert!(!provider.is_pending());
        assertion.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_assertion_is_invalid_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/portal").with_status(200).create_async().await;
        server
            .mock("POST", "/portal")
            .with_status(200)
            .with_body(saml_page("/acs", r#"<input name="SAMLResponse" value="x"/>"#))
            .create_async()
            .await;
        server.mock("POST", "/acs").with_status(403).create_async().await;

        let provider = SsoProvider::new(credentials(), &config_for(&server.url()));
        let result = provider.login().await;
        assert!(matches!(
            result,
            Err(Error::InvalidStatus { status }) if status == StatusCode::FORBIDDEN
        ));
        assert!(provider.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_login_is_rejected() {
        // Accepts connections but never answers, so the first login stays pending
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = accepted_tx.send(());
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let provider = Arc::new(
            SsoProvider::new(credentials(), &config_for(&format!("http://{}", address))),
        );
        let first = tokio::spawn({
            let provider = Arc::clone(&provider);
            async move { provider.login().await }
        });

        accepted_rx.await.unwrap();
        assert!(provider.is_pending());
        let second = provider.login().await;
        assert!(matches!(second, Err(Error::ConcurrentLogin)));

        first.abort();
        let _ = first.await;
        server.abort();
        assert!(!provider.is_pending());
    }

    #[test]
    fn test_resolve_relative_action_against_origin() {
        let sso =
            Url::parse("https://a4.ucsd.edu:8443/tritON/profile/SAML2/Redirect/SSO?x=1").unwrap();
        assert_eq!(
            resolve_action(&sso, "/Shibboleth.sso/SAML2/POST").unwrap().as_str(),
            "https://a4.ucsd.edu:8443/Shibboleth.sso/SAML2/POST"
        );
        assert_eq!(
            resolve_action(&sso, "acs").unwrap().as_str(),
            "https://a4.ucsd.edu:8443/acs"
        );
        assert_eq!(
            resolve_action(&sso, "https://act.ucsd.edu/Shibboleth.sso/SAML2/POST")
                .unwrap()
                .as_str(),
            "https://act.ucsd.edu/Shibboleth.sso/SAML2/POST"
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("jdoe"));
        assert!(!debug.contains("hunter2"));
    }
}
