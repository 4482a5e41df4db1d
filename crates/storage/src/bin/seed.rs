use std::fmt;

use chrono::{DateTime, Duration, Utc};
use course_core::model::{
    CourseDraft, CourseProgress, Enrollment, EnrollmentStatus, LessonDraft, Material, MaterialId,
    UserId, UserProfile, slugify,
};
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_name: String,
    lessons: u32,
    user_id: UserId,
    username: String,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidLessons { raw: String },
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSES_DB_URL").unwrap_or_else(|_| "sqlite:courses.sqlite3".into());
        let mut course_name =
            std::env::var("COURSES_SEED_COURSE").unwrap_or_else(|_| "Introduction to Rust".into());
        let mut lessons = std::env::var("COURSES_SEED_LESSONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut user_id = UserId::new(1);
        let mut username = "student".to_owned();
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course" => {
                    course_name = require_value(&mut args, "--course")?;
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    user_id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--username" => {
                    username = require_value(&mut args, "--username")?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_name,
            lessons,
            user_id,
            username,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:courses.sqlite3)");
    eprintln!("  --course <name>           Course name (default: Introduction to Rust)");
    eprintln!("  --lessons <n>             Number of lessons to create (default: 3)");
    eprintln!("  --user-id <id>            Student to enroll (default: 1)");
    eprintln!("  --username <name>         Student username (default: student)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSES_DB_URL, COURSES_SEED_COURSE, COURSES_SEED_LESSONS");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let user = UserProfile::new(args.user_id, args.username.clone(), None, None)?;
    storage.users.upsert_user(&user).await?;

    let course = match storage
        .courses
        .get_course_by_slug(&slugify(&args.course_name))
        .await?
    {
        Some(course) => course,
        None => {
            let draft = CourseDraft::named(args.course_name.clone())
                .with_description("Seeded demo course");
            storage.courses.insert_course(draft.validate(now)?).await?
        }
    };

    let existing = storage.courses.list_lessons(course.id).await?;
    let start = i32::try_from(existing.len())?;
    for i in 0..args.lessons {
        let number = start + i32::try_from(i)? + 1;
        let lesson = LessonDraft::new(course.id, format!("Lesson {number}"), number)
            .released_on((now - Duration::days(1)).date_naive())
            .validate(now)?;
        let lesson = storage.courses.insert_lesson(lesson).await?;
        let material = Material::new(
            MaterialId::new(1),
            lesson.id,
            format!("Notes for lesson {number}"),
            None,
            Some(format!("lesson_{number}.pdf")),
        )?;
        storage.courses.insert_material(&material).await?;
    }

    let enrollment = storage
        .enrollments
        .upsert_enrollment(user.id(), course.id, EnrollmentStatus::Approved, now)
        .await?;
    let progress = fresh_progress(&storage, &enrollment, now).await?;

    println!(
        "Seeded course {} ({}) with {} new lessons; user {} enrolled (progress {}, {}/{} lessons, {:.2}%) into {}",
        course.id.value(),
        course.slug,
        args.lessons,
        user.id().value(),
        progress.id().value(),
        progress.completed_lessons(),
        progress.total_lessons(),
        progress.percentage(),
        args.db_url
    );

    Ok(())
}

/// Ensure the progress row exists and return it with counts that include
/// lessons added by this run.
async fn fresh_progress(
    storage: &Storage,
    enrollment: &Enrollment,
    now: DateTime<Utc>,
) -> Result<CourseProgress, StorageError> {
    let created = storage.progress.create_progress_if_absent(enrollment).await?;
    let recomputed = storage
        .progress
        .recompute_progress(enrollment.user_id, enrollment.course_id, now)
        .await?;
    Ok(recomputed.unwrap_or(created))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;

    #[tokio::test]
    async fn reseeding_reports_current_lesson_counts() {
        let storage = Storage::in_memory();
        let now = fixed_now();
        let course = storage
            .courses
            .insert_course(CourseDraft::named("Seeded").validate(now).unwrap())
            .await
            .unwrap();
        let first = storage
            .courses
            .insert_lesson(LessonDraft::new(course.id, "One", 1).validate(now).unwrap())
            .await
            .unwrap();
        let user = UserId::new(1);
        let enrollment = storage
            .enrollments
            .upsert_enrollment(user, course.id, EnrollmentStatus::Approved, now)
            .await
            .unwrap();
        let initial = fresh_progress(&storage, &enrollment, now).await.unwrap();
        assert_eq!(initial.total_lessons(), 1);

        storage
            .completions
            .set_completed(user, first.id, true, now)
            .await
            .unwrap();
        storage
            .courses
            .insert_lesson(LessonDraft::new(course.id, "Two", 2).validate(now).unwrap())
            .await
            .unwrap();

        let reseeded = fresh_progress(&storage, &enrollment, now).await.unwrap();
        assert_eq!(reseeded.id(), initial.id());
        assert_eq!(reseeded.completed_lessons(), 1);
        assert_eq!(reseeded.total_lessons(), 2);
        assert!((reseeded.percentage() - 50.0).abs() < f64::EPSILON);
    }
}
