use std::sync::Arc;

use course_core::Clock;
use course_core::model::{
    CertificateNumber, CourseDraft, EnrollmentStatus, LessonDraft, NewCertificate, UserId,
    UserProfile,
};
use course_core::time::fixed_now;
use services::{AppServices, EngineConfig, ProgressError};
use storage::InMemoryBlobStore;
use storage::repository::{
    CertificateRepository, CourseProgressRepository, EnrollmentRepository,
    LessonCompletionRepository, Storage, UserRepository,
};
use tempfile::TempDir;

#[tokio::test]
async fn sqlite_number_collision_surfaces_as_duplicate_number() {
    let dir: TempDir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("numbers.sqlite3").display());
    let storage = Storage::sqlite(&url).await.unwrap();
    let app = AppServices::from_storage(
        storage.clone(),
        Arc::new(InMemoryBlobStore::new()),
        Clock::fixed(fixed_now()),
        EngineConfig::default(),
    );

    let course = app
        .catalog()
        .create_course(CourseDraft::named("Numbers"))
        .await
        .unwrap();
    let lesson = app
        .catalog()
        .add_lesson(LessonDraft::new(course.id, "Only", 1))
        .await
        .unwrap();

    let (owner, other) = (UserId::new(1), UserId::new(2));
    let mut complete = Vec::new();
    for user in [owner, other] {
        storage
            .users
            .upsert_user(&UserProfile::new(user, format!("user{user}"), None, None).unwrap())
            .await
            .unwrap();
        let enrollment = storage
            .enrollments
            .upsert_enrollment(user, course.id, EnrollmentStatus::Approved, fixed_now())
            .await
            .unwrap();
        storage.progress.create_progress_if_absent(&enrollment).await.unwrap();
        storage
            .completions
            .set_completed(user, lesson.id, true, fixed_now())
            .await
            .unwrap();
        complete.push(
            storage
                .progress
                .recompute_progress(user, course.id, fixed_now())
                .await
                .unwrap()
                .unwrap(),
        );
    }

    // The other user's certificate already carries the owner's derived number.
    let taken = CertificateNumber::derive(owner, course.id, fixed_now());
    storage
        .certificates
        .insert_certificate(
            NewCertificate::for_progress(&complete[1], taken.clone(), fixed_now()).unwrap(),
        )
        .await
        .unwrap();

    let err = app
        .progress()
        .issuer()
        .create_certificate(&complete[0])
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::DuplicateCertificateNumber(n) if n == taken));
    assert!(
        storage
            .certificates
            .get_certificate(owner, course.id)
            .await
            .unwrap()
            .is_none()
    );
}
