//! Session refresh through a headless browser subprocess
//!
//! Selecting a term only sticks once the portal's own client-side script has run, which
//! plain HTTP calls cannot do. The refresher hands the current cookies to a headless
//! browser, lets it reload the portal page, and reads the resulting cookies back.
//!
//! The exchange goes through a single JSON file (see [`CookieSnapshot`]):
//!
//! ```text
//! <program> [browser args...] <script> <cookie-file> [term-code]
//! ```
//!
//! Exit status 0 means the file was rewritten with the browser's cookies; 1 means the
//! cookie file was missing.

use crate::cookies::{self, CookieJar, CookieSnapshot, TrustedDomains};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

pub const DEFAULT_PROGRAM: &str = "phantomjs";
pub const DEFAULT_SCRIPT: &str = "scripts/refresh_session.js";
pub const DEFAULT_PERSISTED_PATH: &str = "cookies.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long output is still drained after the browser exits
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How to launch the browser and where to keep the refreshed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefresherConfig {
    /// Browser executable
    pub program: PathBuf,
    /// Script the browser runs
    pub script: PathBuf,
    /// Flags passed to the browser before the script
    pub browser_args: Vec<String>,
    /// Term the browser selects; the script falls back to its own default when unset
    pub term_code: Option<String>,
    /// Where the refreshed snapshot is kept for later runs
    pub persisted_path: PathBuf,
    /// Upper bound on the subprocess run time
    pub timeout: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            script: PathBuf::from(DEFAULT_SCRIPT),
            browser_args: vec![
                "--ignore-ssl-errors=true".to_string(),
                "--local-to-remote-url-access=true".to_string(),
            ],
            term_code: None,
            persisted_path: PathBuf::from(DEFAULT_PERSISTED_PATH),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Runs the browser subprocess against a cookie jar
#[derive(Debug, Clone)]
pub struct SessionRefresher {
    config: RefresherConfig,
    trusted: TrustedDomains,
}

impl SessionRefresher {
    pub fn new(config: RefresherConfig, trusted: TrustedDomains) -> Self {
        Self { config, trusted }
    }

    pub fn config(&self) -> &RefresherConfig {
        &self.config
    }

    /// Whether a snapshot from an earlier refresh is available
    pub fn has_persisted(&self) -> bool {
        self.config.persisted_path.is_file()
    }

    /// Merge the snapshot kept by an earlier refresh into `jar`
    pub async fn load_persisted(&self, jar: &CookieJar) -> Result<CookieSnapshot> {
        let snapshot = CookieSnapshot::load(&self.config.persisted_path).await?;
        cookies::merge(jar, &snapshot);
        tracing::info!(
            path = %self.config.persisted_path.display(),
            cookies = snapshot.len(),
            "Loaded persisted session"
        );
        Ok(snapshot)
    }

    /// Refresh the session held by `jar`
    ///
    /// On success the browser's cookies are merged into `jar` and written to the
    /// persisted path. On any failure `jar` keeps its previous cookies, so callers
    /// can carry on with the stale session or retry.
    pub async fn refresh(&self, jar: &CookieJar) -> Result<CookieSnapshot> {
        let exchange = tempfile::Builder::new()
            .prefix("webreg-cookies-")
            .suffix(".json")
            .tempfile()?;
        cookies::collect(jar, &self.trusted)
            .save(exchange.path())
            .await?;

        self.run_browser(exchange.path()).await?;

        let refreshed = CookieSnapshot::load(exchange.path()).await?;
        cookies::merge(jar, &refreshed);

        let persisted = cookies::collect(jar, &self.trusted);
        persisted.save(&self.config.persisted_path).await?;
        tracing::info!(
            cookies = persisted.len(),
            path = %self.config.persisted_path.display(),
            "Session refreshed"
        );
        Ok(persisted)
    }

    async fn run_browser(&self, cookie_file: &Path) -> Result<()> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.browser_args)
            .arg(&self.config.script)
            .arg(cookie_file)
            .args(self.config.term_code.as_deref())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        tracing::debug!(
            program = %self.config.program.display(),
            script = %self.config.script.display(),
            term = ?self.config.term_code,
            "Starting session refresher"
        );
        let mut child = command.spawn().map_err(|source| Error::RefresherSpawn {
            program: self.config.program.clone(),
            source,
        })?;

        let stdout = forward_output(child.stdout.take(), "stdout");
        let stderr = forward_output(child.stderr.take(), "stderr");

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.config.timeout,
                    "Session refresher timed out, killing it"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill session refresher: {}", e);
                }
                return Err(Error::RefresherTimeout(self.config.timeout));
            }
        };

        // A leftover grandchild can hold the pipes open long after the browser exited
        for mut task in [stdout, stderr].into_iter().flatten() {
            if tokio::time::timeout(OUTPUT_GRACE, &mut task).await.is_err() {
                tracing::debug!("Session refresher output still open, detaching");
                task.abort();
            }
        }

        if !status.success() {
            tracing::warn!(code = ?status.code(), "Session refresher failed");
            return Err(Error::RefresherExited {
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// Log each line the browser prints
fn forward_output<R>(stream: Option<R>, name: &'static str) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(stream = name, "refresher: {}", line);
        }
    }))
}
