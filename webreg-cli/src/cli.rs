//! CLI argument parsing using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use webreg_client::GradingOption;

/// Grading option as accepted on the command line
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum Grade {
    /// Letter grade (default)
    #[default]
    Letter,
    /// Pass / no pass
    Pass,
    /// Satisfactory / unsatisfactory
    Satisfactory,
}

impl From<Grade> for GradingOption {
    fn from(grade: Grade) -> Self {
        match grade {
            Grade::Letter => GradingOption::Letter,
            Grade::Pass => GradingOption::PassNoPass,
            Grade::Satisfactory => GradingOption::SatisfactoryUnsatisfactory,
        }
    }
}

/// A section of a course, e.g. `CSE 100 123456`
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct SectionArgs {
    /// Subject code, e.g. CSE
    pub subject: String,
    /// Course code, e.g. 100
    pub course: String,
    /// Section number
    pub section: u32,
}

/// Command to run against the backend
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and save the session cookies without doing anything else
    Login,
    /// Show the student profile from the portal landing page
    Profile,
    /// List available terms
    Terms,
    /// List subjects offered in the term
    Subjects,
    /// List courses of a subject
    Courses {
        /// Subject code, e.g. CSE
        subject: String,
    },
    /// Show the prerequisites of a course
    Prereqs {
        subject: String,
        course: String,
    },
    /// List every section of a course
    Sections {
        subject: String,
        course: String,
    },
    /// List the sections you are enrolled or waitlisted in
    Schedule,
    /// Enroll in a section
    Enroll {
        #[command(flatten)]
        section: SectionArgs,
        /// Grading option
        #[arg(long, value_enum, default_value = "letter")]
        grade: Grade,
        /// Units to enroll for (defaults to the section's default units)
        #[arg(long)]
        unit: Option<f64>,
    },
    /// Drop an enrolled section
    Drop {
        #[command(flatten)]
        section: SectionArgs,
    },
    /// Join the waitlist of a section
    Wait {
        #[command(flatten)]
        section: SectionArgs,
        #[arg(long, value_enum, default_value = "letter")]
        grade: Grade,
        #[arg(long)]
        unit: Option<f64>,
    },
    /// Leave the waitlist of a section
    Unwait {
        #[command(flatten)]
        section: SectionArgs,
    },
    /// Show the add/drop window of the term
    Window,
    /// Show enrollment pass appointments
    Pass,
    /// Send a confirmation email through the backend
    Email {
        /// Message text
        content: String,
    },
}

impl Command {
    /// Whether the command operates on a selected term
    pub fn needs_term(&self) -> bool {
        !matches!(self, Command::Login | Command::Profile | Command::Terms)
    }
}

/// WebReg enrollment client
#[derive(Parser, Debug)]
#[command(name = "webreg", about = "Browse courses and manage enrollment on WebReg", version)]
pub struct Args {
    /// SSO username
    #[arg(short, long, env = "WEBREG_USERNAME")]
    pub username: Option<String>,

    /// Reuse the cookies in this snapshot file instead of logging in
    #[arg(long, env = "WEBREG_COOKIES")]
    pub cookies: Option<PathBuf>,

    /// Where session cookies are saved after login or refresh
    #[arg(long, default_value = "~/.cache/webreg/cookies.json")]
    pub session_file: PathBuf,

    /// Term code to operate on (defaults to the first term offered)
    #[arg(short, long)]
    pub term: Option<String>,

    /// Refresh the session through the headless browser before selecting the term
    #[arg(long)]
    pub refresh: bool,

    /// Headless browser executable used by --refresh
    #[arg(long, default_value = "phantomjs")]
    pub browser: PathBuf,

    /// Script the browser runs for --refresh
    #[arg(long, default_value = "scripts/refresh_session.js")]
    pub script: PathBuf,

    /// Give up on the browser after this long (e.g. 90s, 2m)
    #[arg(long, default_value = "2m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    #[command(subcommand)]
    pub command: Command,
}
