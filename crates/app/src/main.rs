use std::fmt;
use std::path::PathBuf;

use course_core::model::{CourseDraft, CourseId, LessonDraft, LessonId, UserId, UserProfile};
use serde::Serialize;
use services::{AppServices, Clock, EngineConfig};
use storage::repository::UserRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn parse_id(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- demo       [--db <sqlite_url>] [--lessons <n>]");
    eprintln!("  cargo run -p app -- enroll     --user <id> --course <id>");
    eprintln!("  cargo run -p app -- complete   --user <id> --lesson <id>");
    eprintln!("  cargo run -p app -- incomplete --user <id> --lesson <id>");
    eprintln!("  cargo run -p app -- progress   --user <id> [--course <id>]");
    eprintln!("  cargo run -p app -- certificate --user <id> --course <id>");
    eprintln!("  cargo run -p app -- download   --user <id> --course <id> [--out <path>]");
    eprintln!("  cargo run -p app -- rerender   --user <id> --course <id>");
    eprintln!("  cargo run -p app -- verify     --number <certificate_number>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://courses.sqlite3");
    eprintln!("  --lessons 3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSES_DB_URL, RUST_LOG");
    eprintln!("  COURSES_CERT_DIR, COURSES_CERT_RENDER, COURSES_CERT_WRAP_WIDTH,");
    eprintln!("  COURSES_CERT_MAX_ATTEMPTS");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Demo,
    Enroll,
    Complete,
    Incomplete,
    Progress,
    Certificate,
    Download,
    Rerender,
    Verify,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "demo" => Some(Self::Demo),
            "enroll" => Some(Self::Enroll),
            "complete" => Some(Self::Complete),
            "incomplete" => Some(Self::Incomplete),
            "progress" => Some(Self::Progress),
            "certificate" => Some(Self::Certificate),
            "download" => Some(Self::Download),
            "rerender" => Some(Self::Rerender),
            "verify" => Some(Self::Verify),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user: Option<UserId>,
    course: Option<CourseId>,
    lesson: Option<LessonId>,
    lessons: u32,
    out: Option<PathBuf>,
    number: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("COURSES_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("courses.sqlite3".into()), normalize_sqlite_url),
            user: None,
            course: None,
            lesson: None,
            lessons: 3,
            out: None,
            number: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user" => parsed.user = Some(UserId::new(parse_id(args, "--user")?)),
                "--course" => parsed.course = Some(CourseId::new(parse_id(args, "--course")?)),
                "--lesson" => parsed.lesson = Some(LessonId::new(parse_id(args, "--lesson")?)),
                "--lessons" => {
                    let raw = parse_id(args, "--lessons")?;
                    parsed.lessons = u32::try_from(raw).map_err(|_| ArgsError::InvalidId {
                        flag: "--lessons",
                        raw: raw.to_string(),
                    })?;
                }
                "--number" => parsed.number = Some(require_value(args, "--number")?),
                "--out" => parsed.out = Some(PathBuf::from(require_value(args, "--out")?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn user(&self) -> Result<UserId, ArgsError> {
        self.user.ok_or(ArgsError::MissingFlag { flag: "--user" })
    }

    fn course(&self) -> Result<CourseId, ArgsError> {
        self.course.ok_or(ArgsError::MissingFlag { flag: "--course" })
    }

    fn number(&self) -> Result<&str, ArgsError> {
        self.number
            .as_deref()
            .ok_or(ArgsError::MissingFlag { flag: "--number" })
    }

    fn lesson(&self) -> Result<LessonId, ArgsError> {
        self.lesson.ok_or(ArgsError::MissingFlag { flag: "--lesson" })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create a course, enroll a student and complete every lesson.
async fn run_demo(app: &AppServices, lessons: u32) -> Result<(), Box<dyn std::error::Error>> {
    let user = UserId::new(1);
    app.storage()
        .users
        .upsert_user(&UserProfile::new(
            user,
            "demo",
            Some("Demo Student".into()),
            None,
        )?)
        .await?;

    let catalog = app.catalog();
    let course = catalog
        .create_course(
            CourseDraft::named(format!("Demo Course {}", chrono::Utc::now().timestamp()))
                .with_description("Generated by the demo command"),
        )
        .await?;
    let mut lesson_ids = Vec::new();
    for number in 1..=lessons.max(1) {
        let number = i32::try_from(number)?;
        let lesson = catalog
            .add_lesson(LessonDraft::new(course.id, format!("Lesson {number}"), number))
            .await?;
        lesson_ids.push(lesson.id);
    }
    app.enrollment().enroll(user, course.id).await?;
    info!(course_id = %course.id, lessons = lesson_ids.len(), "demo course ready");

    let progress = app.progress();
    for lesson in lesson_ids {
        print_json(&progress.toggle_lesson(user, lesson, true).await?)?;
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite in the binary glue so services stay storage-agnostic.
    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(&parsed.db_url, Clock::system(), EngineConfig::from_env())
        .await?;
    let progress = app.progress();

    match cmd {
        Command::Demo => run_demo(&app, parsed.lessons).await,
        Command::Enroll => {
            let enrollment = app
                .enrollment()
                .enroll(parsed.user()?, parsed.course()?)
                .await?;
            println!("enrollment {} approved", enrollment.id);
            Ok(())
        }
        Command::Complete => {
            print_json(&progress.toggle_lesson(parsed.user()?, parsed.lesson()?, true).await?)
        }
        Command::Incomplete => {
            print_json(&progress.toggle_lesson(parsed.user()?, parsed.lesson()?, false).await?)
        }
        Command::Progress => match parsed.course {
            Some(course) => print_json(&progress.get_course_progress(parsed.user()?, course).await?),
            None => print_json(&progress.dashboard(parsed.user()?).await?),
        },
        Command::Certificate => {
            print_json(&progress.certificate(parsed.user()?, parsed.course()?).await?)
        }
        Command::Download => {
            let mut download = progress
                .download_certificate(parsed.user()?, parsed.course()?)
                .await?;
            let target = parsed
                .out
                .clone()
                .unwrap_or_else(|| PathBuf::from(&download.filename));
            let mut file = tokio::fs::File::create(&target).await?;
            let written = tokio::io::copy(&mut download.reader, &mut file).await?;
            info!(path = %target.display(), bytes = written, "certificate saved");
            Ok(())
        }
        Command::Rerender => {
            print_json(&progress.rerender_certificate(parsed.user()?, parsed.course()?).await?)
        }
        Command::Verify => print_json(&progress.verify_certificate(parsed.number()?).await?),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
