//! WebReg CLI - Command-line driver for the WebReg enrollment client

mod cli;
mod config;
mod error;
mod output;

use clap::Parser;
use cli::{Args, Command, Grade, SectionArgs};
use config::Config;
use error::CliError;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};
use webreg_client::{
    Course, CourseId, LoginOutcome, Portal, PortalConfig, RefresherConfig, SessionRefresher,
    SsoProvider, Subject, Term,
};

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        if let Some(hint) = e.hint() {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

/// Log to stderr at `info`, overridable through `RUST_LOG`
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = Config::from_args(args);
    let portal_config = PortalConfig::default();

    let mut portal = match config.snapshot_source()? {
        Some(path) => Portal::from_snapshot_file(portal_config, path).await?,
        None => login(&config, portal_config).await?,
    };

    if config.command.needs_term() {
        let term = select_term(&mut portal, &config).await?;
        return dispatch(&mut portal, &config.command, &term).await;
    }

    match &config.command {
        Command::Profile => {
            portal.initialize().await?;
            output::print_profile(portal.profile()?);
        }
        Command::Terms => output::print_terms(&portal.get_terms().await?),
        _ => println!("Session saved to {}", config.session_file.display()),
    }
    Ok(())
}

/// Sign in through SSO and save the session for later runs
async fn login(config: &Config, portal_config: PortalConfig) -> Result<Portal, CliError> {
    let credentials = config::resolve_credentials(config.username.as_deref())?;
    let provider = SsoProvider::new(credentials, &portal_config);

    let mut portal = Portal::new(portal_config)?;
    if let LoginOutcome::Unverified { status } = portal.login(&provider).await? {
        tracing::info!(%status, "Signed in, the session is checked when the term is selected");
    }

    portal.snapshot().save(&config.session_file).await?;
    Ok(portal)
}

/// Pick the requested (or first) term, optionally refresh the session, and select it
async fn select_term(portal: &mut Portal, config: &Config) -> Result<Term, CliError> {
    let terms = portal.get_terms().await?;
    let term = match &config.term {
        Some(code) => terms
            .into_iter()
            .find(|term| term.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| CliError::UnknownTerm(code.clone()))?,
        None => terms
            .into_iter()
            .next()
            .ok_or_else(|| CliError::Config("The backend offers no terms".to_string()))?,
    };

    if config.refresh {
        let refresher = SessionRefresher::new(
            RefresherConfig {
                term_code: Some(term.code.clone()),
                ..config.refresher.clone()
            },
            portal.config().trusted_domains(),
        );
        portal.refresh_session(&refresher).await?;
    }

    portal.set_term(&term).await?;
    tracing::info!(term = %term.code, "Using term {}", term.description);
    Ok(term)
}

/// Course id as the backend spells it: upper-case subject, course code padded to three
fn course_id(subject: &str, course: &str) -> CourseId {
    CourseId::new(
        subject.trim().to_ascii_uppercase(),
        format!("{:>3}", course.trim().to_ascii_uppercase()),
    )
}

fn course_for(section: &SectionArgs, grade: Grade, term: &Term) -> Course {
    Course {
        id: course_id(&section.subject, &section.course).with_section(section.section),
        grading_option: grade.into(),
        unit: 0.0,
        term_code: term.code.clone(),
    }
}

async fn dispatch(portal: &mut Portal, command: &Command, term: &Term) -> Result<(), CliError> {
    match command {
        Command::Login | Command::Profile | Command::Terms => {}
        Command::Subjects => output::print_subjects(&portal.search_subjects().await?),
        Command::Courses { subject } => {
            let subject = Subject {
                code: subject.trim().to_ascii_uppercase(),
                ..Subject::default()
            };
            output::print_courses(&portal.search_courses(&subject).await?);
        }
        Command::Prereqs { subject, course } => {
            let course = course_id(subject, course);
            output::print_prerequisites(&portal.get_prerequisites(&course).await?);
        }
        Command::Sections { subject, course } => {
            let course = course_id(subject, course);
            output::print_sections(&portal.webreg()?.search_group_data(term, &course).await?);
        }
        Command::Schedule => output::print_schedule(&portal.webreg()?.get_class(term).await?),
        Command::Enroll { section, grade, unit } => {
            let course = course_for(section, *grade, term);
            let course = match unit {
                Some(unit) => Course { unit: *unit, ..course },
                None => portal.edit_enroll(&course).await?,
            };
            let outcome = portal.add_enroll(&course).await?;
            output::print_outcome("Enroll", &course.id, &outcome);
        }
        Command::Drop { section } => {
            let course = course_for(section, Grade::default(), term);
            let outcome = portal.drop_enroll(&course).await?;
            output::print_outcome("Drop", &course.id, &outcome);
        }
        Command::Wait { section, grade, unit } => {
            let course = course_for(section, *grade, term);
            let course = match unit {
                Some(unit) => Course { unit: *unit, ..course },
                None => portal.edit_wait(&course).await?,
            };
            let outcome = portal.add_wait(&course).await?;
            output::print_outcome("Waitlist", &course.id, &outcome);
        }
        Command::Unwait { section } => {
            let course = course_for(section, Grade::default(), term);
            let outcome = portal.drop_wait(&course).await?;
            output::print_outcome("Leave waitlist", &course.id, &outcome);
        }
        Command::Window => output::print_window(&portal.get_enroll_window().await?),
        Command::Pass => output::print_pass(&portal.get_pass_message().await?),
        Command::Email { content } => {
            if portal.send_email(content).await? {
                println!("Email sent.");
            } else {
                println!("The backend did not confirm the email.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use webreg_client::GradingOption;

    #[test]
    fn test_course_id_padding() {
        assert_eq!(course_id("mae", "8"), CourseId::new("MAE", "  8"));
        assert_eq!(course_id("CSE", "100"), CourseId::new("CSE", "100"));
        assert_eq!(course_id("cse", "15l"), CourseId::new("CSE", "15L"));
    }

    #[test]
    fn test_course_for_section() {
        let term = Term {
            code: "S118".to_string(),
            ..Term::default()
        };
        let section = SectionArgs {
            subject: "cse".to_string(),
            course: "100".to_string(),
            section: 123456,
        };
        let course = course_for(&section, Grade::Pass, &term);
        assert_eq!(course.id, CourseId::new("CSE", "100").with_section(123456));
        assert_eq!(course.grading_option, GradingOption::PassNoPass);
        assert_eq!(course.term_code, "S118");
    }
}
