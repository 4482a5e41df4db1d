use std::sync::Arc;

use chrono::Duration;
use course_core::Clock;
use course_core::model::{CourseDraft, CourseId, LessonDraft, LessonId, UserId, UserProfile};
use course_core::time::fixed_now;
use services::{AppServices, EngineConfig, PDF_CONTENT_TYPE, ProgressError};
use storage::repository::{Storage, UserRepository};
use storage::{BlobStore, InMemoryBlobStore};
use tokio::io::AsyncReadExt;

struct Fixture {
    app: AppServices,
    blobs: Arc<InMemoryBlobStore>,
    user: UserId,
    course: CourseId,
    lessons: Vec<LessonId>,
}

async fn fixture(lesson_count: i32, enroll: bool) -> Fixture {
    let storage = Storage::in_memory();
    let blobs = Arc::new(InMemoryBlobStore::new());
    let app = AppServices::from_storage(
        storage.clone(),
        blobs.clone(),
        Clock::fixed(fixed_now()),
        EngineConfig::default(),
    );

    let user = UserId::new(7);
    storage
        .users
        .upsert_user(
            &UserProfile::new(user, "ana", Some("Ana Souza".into()), None).unwrap(),
        )
        .await
        .unwrap();

    let catalog = app.catalog();
    let course = catalog
        .create_course(CourseDraft::named("Rust Basics"))
        .await
        .unwrap();
    let mut lessons = Vec::new();
    for number in 1..=lesson_count {
        let lesson = catalog
            .add_lesson(LessonDraft::new(course.id, format!("Lesson {number}"), number))
            .await
            .unwrap();
        lessons.push(lesson.id);
    }
    if enroll {
        app.enrollment().enroll(user, course.id).await.unwrap();
    }

    Fixture {
        app,
        blobs,
        user,
        course: course.id,
        lessons,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn three_lessons_reach_one_certificate() {
    let f = fixture(3, true).await;
    let progress = f.app.progress();

    let mut seen = Vec::new();
    for lesson in &f.lessons {
        let outcome = progress.toggle_lesson(f.user, *lesson, true).await.unwrap();
        seen.push(outcome.course_progress.progress_percentage);
    }
    assert_close(seen[0], 33.33);
    assert_close(seen[1], 66.67);
    assert_close(seen[2], 100.0);

    let certs = progress.my_certificates(f.user).await.unwrap();
    assert_eq!(certs.len(), 1);
    let number = certs[0].number().as_str();
    assert_eq!(number.len(), 16);
    assert!(
        number
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    );
    assert!(f.blobs.exists(&certs[0].document_name()).await.unwrap());
}

#[tokio::test]
async fn uncompleting_after_issuance_keeps_the_certificate() {
    let f = fixture(2, true).await;
    let progress = f.app.progress();
    for lesson in &f.lessons {
        progress.mark_complete(f.user, *lesson).await.unwrap();
    }
    let issued = progress.certificate(f.user, f.course).await.unwrap();

    let outcome = progress
        .toggle_lesson(f.user, f.lessons[1], false)
        .await
        .unwrap();
    assert_close(outcome.course_progress.progress_percentage, 50.0);
    assert!(outcome.course_progress.completed);
    assert!(outcome.certificate.is_none());

    let still = progress.certificate(f.user, f.course).await.unwrap();
    assert_eq!(still.number(), issued.number());

    let mut download = progress
        .download_certificate(f.user, f.course)
        .await
        .unwrap();
    assert_eq!(download.content_type, PDF_CONTENT_TYPE);
    assert_eq!(download.filename, format!("certificado_{}.pdf", issued.number()));
    let mut bytes = Vec::new();
    download.reader.read_to_end(&mut bytes).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));

    // Completing again does not issue a second certificate.
    progress.mark_complete(f.user, f.lessons[1]).await.unwrap();
    assert_eq!(progress.my_certificates(f.user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_completion_keeps_first_timestamp() {
    let f = fixture(2, true).await;
    let first = f
        .app
        .progress()
        .mark_complete(f.user, f.lessons[0])
        .await
        .unwrap();

    let later = AppServices::from_storage(
        f.app.storage().clone(),
        f.blobs.clone(),
        Clock::fixed(fixed_now() + Duration::hours(2)),
        EngineConfig::default(),
    );
    let again = later
        .progress()
        .mark_complete(f.user, f.lessons[0])
        .await
        .unwrap();
    assert_eq!(again.completed_at(), first.completed_at());
    assert_eq!(first.completed_at(), Some(fixed_now()));
}

#[tokio::test]
async fn unenrolled_user_is_unauthorized() {
    let f = fixture(1, false).await;
    let err = f
        .app
        .progress()
        .mark_complete(f.user, f.lessons[0])
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::Unauthorized));

    let unknown = f
        .app
        .progress()
        .mark_complete(f.user, LessonId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(unknown, ProgressError::NotFound(_)));
}

#[tokio::test]
async fn toggle_outcome_serializes_like_the_json_endpoint() {
    let f = fixture(1, true).await;
    let outcome = f
        .app
        .progress()
        .toggle_lesson(f.user, f.lessons[0], true)
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["lesson_progress"]["completed"], true);
    assert_eq!(json["course_progress"]["completed_lessons"], 1);
    assert_eq!(json["course_progress"]["total_lessons"], 1);
    assert_eq!(json["course_progress"]["progress_percentage"], 100.0);
    assert_eq!(json["course_progress"]["completed"], true);
    assert_eq!(json["certificate"]["generated"], true);
    assert_eq!(
        json["certificate"]["certificate_number"]
            .as_str()
            .map(str::len),
        Some(16)
    );
}

#[tokio::test]
async fn dashboard_pairs_progress_with_certificates() {
    let f = fixture(1, true).await;
    let progress = f.app.progress();
    let before = progress.dashboard(f.user).await.unwrap();
    assert_eq!(before.len(), 1);
    assert!(before[0].certificate.is_none());

    progress.mark_complete(f.user, f.lessons[0]).await.unwrap();
    let after = progress.dashboard(f.user).await.unwrap();
    assert!(after[0].progress.is_complete());
    assert!(after[0].certificate.is_some());
}

#[tokio::test]
async fn certificates_verify_by_printed_number() {
    let f = fixture(1, true).await;
    let progress = f.app.progress();
    progress.mark_complete(f.user, f.lessons[0]).await.unwrap();
    let issued = progress.certificate(f.user, f.course).await.unwrap();

    let typed = format!("  {}\n", issued.number().as_str().to_ascii_lowercase());
    let verified = progress.verify_certificate(&typed).await.unwrap();
    assert_eq!(verified, issued);

    for bogus in ["0000000000000000", "not-a-number"] {
        let err = progress.verify_certificate(bogus).await.unwrap_err();
        assert!(matches!(err, ProgressError::NotFound(_)));
    }
}
