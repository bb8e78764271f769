//! Cookie jar shared by the HTTP clients, and its bridge to persisted snapshots
//!
//! The [`CookieJar`] is the live authenticated identity. Both the SSO client and the
//! backend client write `Set-Cookie` responses into the same jar through reqwest's
//! [`CookieStore`](reqwest::cookie::CookieStore) hook. [`collect`] and [`merge`] move
//! cookies between a jar and a [`CookieSnapshot`], the JSON file format exchanged with
//! the browser subprocess.

use crate::error::Result;
use reqwest::Url;
use reqwest::header::HeaderValue;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// A cookie held by a [`CookieJar`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Domain without a leading dot, lowercase
    pub domain: String,
    pub path: String,
    /// Only sent to exactly `domain`, not its subdomains
    pub host_only: bool,
    pub secure: bool,
    pub http_only: bool,
    /// `None` for session cookies
    pub expires: Option<SystemTime>,
}

impl Cookie {
    /// Creates a host-only session cookie on path `/`
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            host_only: true,
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    /// Whether this cookie would be sent to `host`
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.host_only {
            return host == self.domain;
        }
        host == self.domain
            || host
                .strip_suffix(self.domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    fn matches_path(&self, request_path: &str) -> bool {
        request_path == self.path
            || (request_path.starts_with(self.path.as_str())
                && (self.path.ends_with('/')
                    || request_path[self.path.len()..].starts_with('/')))
    }

    fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.matches_host(host)
            && self.matches_path(url.path())
            && (!self.secure || url.scheme() == "https")
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at <= SystemTime::now())
    }

    fn key(&self) -> CookieKey {
        CookieKey {
            domain: self.domain.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
        }
    }

    /// Parse a `Set-Cookie` header received from `url`
    ///
    /// Returns `None` for unparsable headers and for `Domain` attributes that do not
    /// cover the responding host.
    fn from_set_cookie(header: &str, url: &Url) -> Option<Self> {
        let parsed = cookie::Cookie::parse(header).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let (domain, host_only) = match parsed.domain() {
            Some(domain) if !domain.trim_start_matches('.').is_empty() => {
                let domain = normalize_domain(domain);
                let candidate = Cookie {
                    host_only: false,
                    ..Cookie::new("", "", domain.clone())
                };
                if !candidate.matches_host(&host) {
                    return None;
                }
                (domain, false)
            }
            _ => (host, true),
        };

        let path = match parsed.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => default_path(url),
        };

        let expires = match parsed.max_age() {
            Some(max_age) => {
                let seconds = max_age.whole_seconds().max(0) as u64;
                // Out of range means the cookie outlives any clock, so it never expires
                SystemTime::now().checked_add(Duration::from_secs(seconds))
            }
            None => parsed.expires_datetime().map(SystemTime::from),
        };

        Some(Cookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            host_only,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            expires,
        })
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Directory of the request path, as used for cookies without a `Path` attribute
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CookieKey {
    domain: String,
    name: String,
    path: String,
}

/// In-memory cookie store keyed by (domain, name, path)
///
/// Writes with an existing key replace the previous cookie. The jar is meant to be
/// driven by one session at a time; the lock only exists because reqwest requires
/// cookie stores to be `Sync`.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<CookieKey, Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie, replacing any cookie with the same domain, name and path
    ///
    /// An already expired cookie removes its counterpart instead.
    pub fn insert(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        if cookie.is_expired() {
            cookies.remove(&cookie.key());
        } else {
            cookies.insert(cookie.key(), cookie);
        }
    }

    /// All live cookies, ordered by domain, name and path
    pub fn all(&self) -> Vec<Cookie> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        cookies.values().filter(|c| !c.is_expired()).cloned().collect()
    }

    /// First live cookie with the given name that would be sent to `host`
    pub fn get(&self, host: &str, name: &str) -> Option<Cookie> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        cookies
            .values()
            .find(|c| c.name == name && c.matches_host(host) && !c.is_expired())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Cookies that a request to `url` would carry, most specific path first
    pub fn cookies_for(&self, url: &Url) -> Vec<Cookie> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Cookie> = cookies
            .values()
            .filter(|c| !c.is_expired() && c.matches_url(url))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Ok(text) = header.to_str() else {
                tracing::debug!("Ignoring non-ASCII Set-Cookie header from {}", url);
                continue;
            };
            match Cookie::from_set_cookie(text, url) {
                Some(cookie) => self.insert(cookie),
                None => tracing::debug!("Ignoring Set-Cookie header rejected for {}", url),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .cookies_for(url)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

/// The two hosts whose cookies make up the authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDomains {
    hosts: [String; 2],
}

impl TrustedDomains {
    pub fn new(login_host: impl Into<String>, portal_host: impl Into<String>) -> Self {
        Self {
            hosts: [
                normalize_domain(&login_host.into()),
                normalize_domain(&portal_host.into()),
            ],
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Whether `cookie` would be sent to either trusted host
    pub fn covers(&self, cookie: &Cookie) -> bool {
        self.hosts.iter().any(|host| cookie.matches_host(host))
    }
}

/// One entry of a persisted cookie snapshot
///
/// Keys are matched case-insensitively on read, so files written by other
/// serializers (`Name`, `HttpOnly`, ...) load as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    /// Leading dot marks a domain cookie, no dot a host-only cookie
    pub domain: String,
    pub path: String,
    pub httponly: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
}

impl<'de> Deserialize<'de> for CookieRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields: HashMap<String, serde_json::Value> =
            HashMap::<String, serde_json::Value>::deserialize(deserializer)?
                .into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value))
                .collect();

        let text = |key: &str| {
            fields
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        let flag = |key: &str| {
            fields
                .get(key)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        };

        Ok(CookieRecord {
            name: text("name").ok_or_else(|| D::Error::missing_field("name"))?,
            value: text("value").unwrap_or_default(),
            domain: text("domain").ok_or_else(|| D::Error::missing_field("domain"))?,
            path: text("path").unwrap_or_else(|| "/".to_string()),
            httponly: flag("httponly"),
            secure: flag("secure"),
        })
    }
}

impl From<&Cookie> for CookieRecord {
    fn from(cookie: &Cookie) -> Self {
        let domain = if cookie.host_only {
            cookie.domain.clone()
        } else {
            format!(".{}", cookie.domain)
        };
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain,
            path: cookie.path.clone(),
            httponly: cookie.http_only,
            secure: cookie.secure,
        }
    }
}

impl From<CookieRecord> for Cookie {
    fn from(record: CookieRecord) -> Self {
        let host_only = !record.domain.trim().starts_with('.');
        Self {
            name: record.name,
            value: record.value,
            domain: normalize_domain(&record.domain),
            path: if record.path.starts_with('/') {
                record.path
            } else {
                "/".to_string()
            },
            host_only,
            secure: record.secure,
            http_only: record.httponly,
            expires: None,
        }
    }
}

/// Ordered list of cookies in the interchange format used with the browser subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSnapshot {
    records: Vec<CookieRecord>,
}

impl CookieSnapshot {
    pub fn records(&self) -> &[CookieRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a snapshot file
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Write the snapshot to `path`, creating parent directories as needed
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }
}

impl FromIterator<CookieRecord> for CookieSnapshot {
    fn from_iter<I: IntoIterator<Item = CookieRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Gather the cookies of `jar` that belong to the trusted hosts
pub fn collect(jar: &CookieJar, trusted: &TrustedDomains) -> CookieSnapshot {
    jar.all()
        .iter()
        .filter(|cookie| trusted.covers(cookie))
        .map(CookieRecord::from)
        .collect()
}

/// Add every snapshot cookie to `jar`; later entries win on equal domain, name and path
pub fn merge(jar: &CookieJar, snapshot: &CookieSnapshot) {
    for record in snapshot.records() {
        jar.insert(Cookie::from(record.clone()));
    }
}
