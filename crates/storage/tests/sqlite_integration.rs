use chrono::Duration;
use course_core::model::{
    AnnouncementDraft, CertificateNumber, CourseDraft, CourseId, EnrollmentStatus, Lesson,
    LessonDraft, Material, MaterialId, NewCertificate, UserId,
};
use course_core::time::fixed_now;
use storage::repository::{
    AnnouncementRepository, CertificateRepository, CourseProgressRepository, CourseRepository,
    EnrollmentRepository, LessonCompletionRepository, StorageError, UniqueKey,
};
use storage::sqlite::SqliteRepository;
use tempfile::TempDir;

async fn file_repo() -> (TempDir, SqliteRepository) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.sqlite3").display());
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    (dir, repo)
}

async fn seed_course(repo: &SqliteRepository, lessons: i32) -> (CourseId, Vec<Lesson>) {
    let course = repo
        .insert_course(CourseDraft::named("Rust Basics").validate(fixed_now()).unwrap())
        .await
        .unwrap();
    // Insert in reverse so roster ordering is exercised.
    let mut out = Vec::new();
    for number in (1..=lessons).rev() {
        let draft = LessonDraft::new(course.id, format!("Lesson {number}"), number)
            .validate(fixed_now())
            .unwrap();
        out.push(repo.insert_lesson(draft).await.unwrap());
    }
    out.sort_by_key(|l| l.number);
    (course.id, out)
}

#[tokio::test]
async fn roster_is_ordered_by_number_and_materials_attach() {
    let (_dir, repo) = file_repo().await;
    let (course_id, lessons) = seed_course(&repo, 3).await;

    let roster = repo.list_lessons(course_id).await.unwrap();
    let numbers: Vec<i32> = roster.iter().map(|l| l.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let material = Material::new(
        MaterialId::new(1),
        lessons[0].id,
        "Slides",
        None,
        Some("slides.pdf".into()),
    )
    .unwrap();
    let stored = repo.insert_material(&material).await.unwrap();
    let listed = repo.list_materials(lessons[0].id).await.unwrap();
    assert_eq!(listed, vec![stored]);

    let by_slug = repo.get_course_by_slug("rust-basics").await.unwrap();
    assert_eq!(by_slug.map(|c| c.id), Some(course_id));
}

#[tokio::test]
async fn completion_upsert_keeps_timestamp_on_repeat() {
    let (_dir, repo) = file_repo().await;
    let (_, lessons) = seed_course(&repo, 1).await;
    let user = UserId::new(9);
    let t0 = fixed_now();

    let first = repo.set_completed(user, lessons[0].id, true, t0).await.unwrap();
    let repeat = repo
        .set_completed(user, lessons[0].id, true, t0 + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(first.completed_at(), Some(t0));
    assert_eq!(repeat.completed_at(), Some(t0));

    let off = repo
        .set_completed(user, lessons[0].id, false, t0 + Duration::minutes(6))
        .await
        .unwrap();
    assert!(!off.completed());
    assert_eq!(off.completed_at(), None);
}

#[tokio::test]
async fn completion_for_unknown_lesson_is_not_found() {
    let (_dir, repo) = file_repo().await;
    let err = repo
        .set_completed(
            UserId::new(1),
            course_core::model::LessonId::new(404),
            true,
            fixed_now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn recompute_counts_and_certificate_keys() {
    let (_dir, repo) = file_repo().await;
    let (course_id, lessons) = seed_course(&repo, 2).await;
    let user = UserId::new(1);
    let now = fixed_now();

    let enrollment = repo
        .upsert_enrollment(user, course_id, EnrollmentStatus::Approved, now)
        .await
        .unwrap();
    let created = repo.create_progress_if_absent(&enrollment).await.unwrap();
    let again = repo.create_progress_if_absent(&enrollment).await.unwrap();
    assert_eq!(created.id(), again.id());

    repo.set_completed(user, lessons[0].id, true, now).await.unwrap();
    let half = repo
        .recompute_progress(user, course_id, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(half.completed_lessons(), 1);
    assert_eq!(half.total_lessons(), 2);
    assert!((half.percentage() - 50.0).abs() < f64::EPSILON);
    assert!(half.completed_at().is_none());

    repo.set_completed(user, lessons[1].id, true, now).await.unwrap();
    let done = repo
        .recompute_progress(user, course_id, now)
        .await
        .unwrap()
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(done.completed_at(), Some(now));

    let number = CertificateNumber::derive(user, course_id, now);
    let cert = repo
        .insert_certificate(NewCertificate::for_progress(&done, number.clone(), now).unwrap())
        .await
        .unwrap();
    assert_eq!(cert.number(), &number);

    let dup_owner = NewCertificate::for_progress(
        &done,
        CertificateNumber::derive(user, course_id, now + Duration::seconds(1)),
        now,
    )
    .unwrap();
    assert!(matches!(
        repo.insert_certificate(dup_owner).await,
        Err(StorageError::UniqueViolation(UniqueKey::CertificateOwner))
    ));

    let attached = repo.attach_document(cert.id(), "doc.pdf").await.unwrap();
    assert_eq!(attached.document(), Some("doc.pdf"));
    assert!(matches!(
        repo.attach_document(cert.id(), "other.pdf").await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn certificate_number_collision_is_reported_by_key() {
    let (_dir, repo) = file_repo().await;
    let (course_a, lessons_a) = seed_course(&repo, 1).await;
    let course_b = repo
        .insert_course(CourseDraft::named("Second").validate(fixed_now()).unwrap())
        .await
        .unwrap()
        .id;
    repo.insert_lesson(
        LessonDraft::new(course_b, "Only", 1)
            .validate(fixed_now())
            .unwrap(),
    )
    .await
    .unwrap();

    let user = UserId::new(3);
    let now = fixed_now();
    let mut progresses = Vec::new();
    for course in [course_a, course_b] {
        let enrollment = repo
            .upsert_enrollment(user, course, EnrollmentStatus::Approved, now)
            .await
            .unwrap();
        repo.create_progress_if_absent(&enrollment).await.unwrap();
        for lesson in repo.list_lessons(course).await.unwrap() {
            repo.set_completed(user, lesson.id, true, now).await.unwrap();
        }
        progresses.push(
            repo.recompute_progress(user, course, now)
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(lessons_a.len(), 1);

    let shared = CertificateNumber::parse("ABCDEF0123456789").unwrap();
    repo.insert_certificate(
        NewCertificate::for_progress(&progresses[0], shared.clone(), now).unwrap(),
    )
    .await
    .unwrap();
    let err = repo
        .insert_certificate(NewCertificate::for_progress(&progresses[1], shared, now).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::UniqueViolation(UniqueKey::CertificateNumber)
    ));
}

#[tokio::test]
async fn concurrent_recomputes_all_succeed() {
    let (_dir, repo) = file_repo().await;
    let (course_id, lessons) = seed_course(&repo, 4).await;
    let user = UserId::new(5);
    let now = fixed_now();
    let enrollment = repo
        .upsert_enrollment(user, course_id, EnrollmentStatus::Approved, now)
        .await
        .unwrap();
    repo.create_progress_if_absent(&enrollment).await.unwrap();

    let mut handles = Vec::new();
    for lesson in lessons {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.set_completed(user, lesson.id, true, now).await?;
            repo.recompute_progress(user, course_id, now).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let final_progress = repo
        .recompute_progress(user, course_id, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(final_progress.completed_lessons(), 4);
    assert!(final_progress.is_complete());
}

#[tokio::test]
async fn enrollment_status_changes_keep_identity() {
    let (_dir, repo) = file_repo().await;
    let (course_id, _) = seed_course(&repo, 1).await;
    let user = UserId::new(2);
    let t0 = fixed_now();

    let pending = repo
        .upsert_enrollment(user, course_id, EnrollmentStatus::Pending, t0)
        .await
        .unwrap();
    let approved = repo
        .upsert_enrollment(
            user,
            course_id,
            EnrollmentStatus::Approved,
            t0 + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(pending.id, approved.id);
    assert_eq!(approved.updated_at, t0 + Duration::hours(1));

    let listed = repo
        .list_enrollments(course_id, EnrollmentStatus::Approved)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn announcements_newest_first_comments_oldest_first() {
    let (_dir, repo) = file_repo().await;
    let (course_id, _) = seed_course(&repo, 1).await;
    let t0 = fixed_now();

    let older = repo
        .insert_announcement(
            AnnouncementDraft {
                course_id,
                title: "Welcome".into(),
                content: "Hello".into(),
            }
            .validate(t0)
            .unwrap(),
        )
        .await
        .unwrap();
    let newer = repo
        .insert_announcement(
            AnnouncementDraft {
                course_id,
                title: "Week 2".into(),
                content: "Next up".into(),
            }
            .validate(t0 + Duration::days(7))
            .unwrap(),
        )
        .await
        .unwrap();

    let listed = repo.list_announcements(course_id).await.unwrap();
    assert_eq!(
        listed.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );

    let first = repo
        .insert_comment(older.id, UserId::new(1), "first", t0 + Duration::minutes(1))
        .await
        .unwrap();
    let second = repo
        .insert_comment(older.id, UserId::new(2), "second", t0 + Duration::minutes(2))
        .await
        .unwrap();
    let comments = repo.list_comments(older.id).await.unwrap();
    assert_eq!(comments, vec![first, second]);
}

#[tokio::test]
async fn cancelled_recompute_releases_the_write_lock() {
    let (_dir, repo) = file_repo().await;
    let (course_id, lessons) = seed_course(&repo, 3).await;
    let user = UserId::new(4);
    let now = fixed_now();
    let enrollment = repo
        .upsert_enrollment(user, course_id, EnrollmentStatus::Approved, now)
        .await
        .unwrap();
    repo.create_progress_if_absent(&enrollment).await.unwrap();

    // Shrink the deadline until a recompute is dropped mid-flight.
    let mut cancelled = 0;
    for micros in (1..=200).rev() {
        let deadline = std::time::Duration::from_micros(micros);
        if tokio::time::timeout(deadline, repo.recompute_progress(user, course_id, now))
            .await
            .is_err()
        {
            cancelled += 1;
        }
    }
    assert!(cancelled > 0, "no recompute was cancelled");

    for lesson in &lessons {
        repo.set_completed(user, lesson.id, true, now).await.unwrap();
        repo.recompute_progress(user, course_id, now)
            .await
            .unwrap()
            .unwrap();
    }
    let done = repo
        .recompute_progress(user, course_id, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.completed_lessons(), 3);
    assert!(done.is_complete());
}

#[tokio::test]
async fn recompute_without_progress_row_commits_cleanly() {
    let (_dir, repo) = file_repo().await;
    let (course_id, lessons) = seed_course(&repo, 1).await;
    let user = UserId::new(6);
    let now = fixed_now();

    // No progress row: the transaction ends without an update.
    assert!(repo.recompute_progress(user, course_id, now).await.unwrap().is_none());

    let enrollment = repo
        .upsert_enrollment(user, course_id, EnrollmentStatus::Approved, now)
        .await
        .unwrap();
    repo.create_progress_if_absent(&enrollment).await.unwrap();
    repo.set_completed(user, lessons[0].id, true, now).await.unwrap();
    let done = repo
        .recompute_progress(user, course_id, now)
        .await
        .unwrap()
        .unwrap();
    assert!(done.is_complete());
}
