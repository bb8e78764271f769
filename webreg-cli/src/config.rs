//! Configuration resolution from CLI args

use crate::cli::{Args, Command};
use crate::error::CliError;
use std::path::{Path, PathBuf};
use webreg_client::{Credentials, RefresherConfig};
use zeroize::Zeroizing;

/// Resolved runtime configuration
#[derive(Debug)]
pub struct Config {
    /// SSO username, prompted for when missing and a login is needed
    pub username: Option<String>,
    /// Snapshot to reuse instead of logging in
    pub cookies: Option<PathBuf>,
    /// Where the session is saved after login or refresh
    pub session_file: PathBuf,
    /// Term code filter (None = first term offered)
    pub term: Option<String>,
    /// Whether to run the browser refresher before selecting the term
    pub refresh: bool,
    /// Browser subprocess settings; the term code is filled in once a term is chosen
    pub refresher: RefresherConfig,
    pub command: Command,
}

impl Config {
    /// Build config from CLI args, expanding `~` in paths
    pub fn from_args(args: Args) -> Self {
        let session_file = expand_tilde(&args.session_file);

        let refresher = RefresherConfig {
            program: args.browser,
            script: expand_tilde(&args.script),
            term_code: args.term.clone(),
            persisted_path: session_file.clone(),
            timeout: args.timeout,
            ..RefresherConfig::default()
        };

        Config {
            username: args.username.filter(|name| !name.trim().is_empty()),
            cookies: args.cookies.as_deref().map(expand_tilde),
            session_file,
            term: args.term,
            refresh: args.refresh,
            refresher,
            command: args.command,
        }
    }

    /// Snapshot file to start from, if one should be used
    ///
    /// An explicit `--cookies` file must exist. Otherwise the saved session is reused
    /// when present, except for `login`, which always signs in again.
    pub fn snapshot_source(&self) -> Result<Option<&Path>, CliError> {
        if let Some(path) = &self.cookies {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "Cookie file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        if self.command != Command::Login && self.session_file.is_file() {
            return Ok(Some(&self.session_file));
        }
        Ok(None)
    }
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str()
        && (path_str.starts_with("~/") || path_str == "~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(path_str.get(2..).unwrap_or_default());
    }
    path.to_path_buf()
}

/// Prompt user for their SSO username
fn prompt_username() -> Result<String, CliError> {
    use std::io::Write;
    print!("Username: ");
    std::io::stdout().flush().ok();

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| CliError::Config(format!("Failed to read username: {}", e)))?;

    let username = input.trim().to_string();
    if username.is_empty() {
        return Err(CliError::Config("Username is required.".to_string()));
    }
    Ok(username)
}

/// Prompt user for their password
fn prompt_password() -> Result<Zeroizing<String>, CliError> {
    let password = Zeroizing::new(
        rpassword::prompt_password("Password: ")
            .map_err(|e| CliError::Config(format!("Failed to read password: {}", e)))?,
    );
    if password.is_empty() {
        return Err(CliError::Config("Password is required.".to_string()));
    }
    Ok(password)
}

/// Resolve login credentials from args, `WEBREG_PASSWORD`, or interactive prompts
pub fn resolve_credentials(username: Option<&str>) -> Result<Credentials, CliError> {
    let username = match username {
        Some(name) => name.to_string(),
        None => prompt_username()?,
    };

    let password = match std::env::var("WEBREG_PASSWORD") {
        Ok(password) if !password.is_empty() => Zeroizing::new(password),
        _ => prompt_password()?,
    };

    Ok(Credentials::new(username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["webreg"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_refresher_follows_args() {
        let config = config(&[
            "--term", "FA18", "--browser", "/usr/bin/phantomjs", "--timeout", "30s",
            "--session-file", "/tmp/webreg/session.json", "subjects",
        ]);

        assert_eq!(config.refresher.program, PathBuf::from("/usr/bin/phantomjs"));
        assert_eq!(config.refresher.term_code.as_deref(), Some("FA18"));
        assert_eq!(config.refresher.timeout, Duration::from_secs(30));
        assert_eq!(config.refresher.persisted_path, PathBuf::from("/tmp/webreg/session.json"));
        assert_eq!(config.refresher.browser_args, RefresherConfig::default().browser_args);
    }

    #[test]
    fn test_missing_cookie_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("cookies.json");
        let config = config(&["--cookies", missing.to_str().unwrap(), "terms"]);
        assert!(matches!(config.snapshot_source(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_saved_session_is_reused_except_for_login() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("cookies.json");
        std::fs::write(&saved, "[]").unwrap();
        let saved_arg = saved.to_str().unwrap();

        let terms = config(&["--session-file", saved_arg, "terms"]);
        assert_eq!(terms.snapshot_source().unwrap(), Some(saved.as_path()));

        let login = config(&["--session-file", saved_arg, "login"]);
        assert_eq!(login.snapshot_source().unwrap(), None);
    }

    #[test]
    fn test_blank_username_is_ignored() {
        let config = config(&["--username", "  ", "terms"]);
        assert!(config.username.is_none());
    }

    proptest! {
        #[test]
        fn prop_expand_tilde_joins_home(relative in "[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
            prop_assume!(dirs::home_dir().is_some());
            let home = dirs::home_dir().unwrap();

            let expanded = expand_tilde(Path::new(&format!("~/{}", relative)));
            prop_assert_eq!(expanded, home.join(&relative));

            let untouched = PathBuf::from(format!("/{}", relative));
            prop_assert_eq!(expand_tilde(&untouched), untouched);
        }
    }
}
