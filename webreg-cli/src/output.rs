//! Output formatting for backend results

use chrono::NaiveDateTime;
use webreg_client::{
    CourseId, CourseSectionInfo, EnrollOutcome, EnrollWindow, PassMessage, Prerequisite, Profile,
    Subject, Term,
};

/// Format an optional backend timestamp
fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a section meeting time from the backend's hour and minute fields
fn format_meeting(hour: i64, minute: i64) -> String {
    format!("{:02}:{:02}", hour, minute)
}

pub fn print_profile(profile: &Profile) {
    println!("Name:    {}", profile.name);
    println!("College: {}", profile.college);
    println!("Major:   {}", profile.major);
    println!("Level:   {}", profile.level);
    println!("Balance: {}", profile.balance);
}

pub fn print_terms(terms: &[Term]) {
    for term in terms {
        println!("{:<6} {}", term.code, term.description);
    }
}

pub fn print_subjects(subjects: &[Subject]) {
    for subject in subjects {
        println!("{:<6} {}", subject.code, subject.description);
    }
}

pub fn print_courses(courses: &[CourseId]) {
    for course in courses {
        println!("{} {}", course.subject, course.code.trim());
    }
}

pub fn print_prerequisites(prerequisites: &[Prerequisite]) {
    if prerequisites.is_empty() {
        println!("No prerequisites.");
        return;
    }
    // Courses sharing an order number are alternatives to each other
    for prerequisite in prerequisites {
        println!("[{}] {}", prerequisite.order, prerequisite.course);
    }
}

pub fn print_sections(sections: &[CourseSectionInfo]) {
    for section in sections {
        println!(
            "{:<8} {:<4} {:<3} {:<6} {}-{} {:<6} {:<6} seats {}/{} {}",
            section.section_number,
            section.sect_code.trim(),
            section.fk_cdi_instr_type.trim(),
            section.day_code.trim(),
            format_meeting(section.begin_hh_time, section.begin_mm_time),
            format_meeting(section.end_hh_time, section.end_mm_time),
            section.bldg_code.trim(),
            section.room_code.trim(),
            section.avail_seat,
            section.sctn_cpcty_qty,
            section.person_full_name.trim(),
        );
    }
}

pub fn print_schedule(sections: &[CourseSectionInfo]) {
    for section in sections {
        println!(
            "{:<20} {:<4} {:<2} {:.2} units  {}",
            section.course_id().to_string(),
            section.enroll_status.trim(),
            section.grade_option.trim(),
            section.sect_credit_hrs,
            section.crse_title.trim(),
        );
    }
}

pub fn print_outcome(action: &str, course: &CourseId, outcome: &EnrollOutcome) {
    if outcome.success {
        println!("{} {}: done", action, course);
    } else if outcome.warning.is_empty() {
        println!("{} {}: rejected", action, course);
    } else {
        println!("{} {}: rejected: {}", action, course, outcome.warning);
    }
}

pub fn print_window(window: &EnrollWindow) {
    println!("Add window: {} to {}", format_time(window.start), format_time(window.end));
}

pub fn print_pass(pass: &PassMessage) {
    println!(
        "First pass:  {} to {}",
        format_time(pass.first_pass_begin),
        format_time(pass.first_pass_end)
    );
    println!(
        "Second pass: {} to {}",
        format_time(pass.second_pass_begin),
        format_time(pass.second_pass_end)
    );
    if !pass.display.trim().is_empty() {
        println!("{}", pass.display.trim());
    }
}
