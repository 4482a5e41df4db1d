use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Announcement, AnnouncementId, Certificate, CertificateId, CertificateNumber, Comment,
    CommentId, Course, CourseId, CourseProgress, CourseProgressId, Enrollment, EnrollmentId,
    EnrollmentStatus, Lesson, LessonCompletion, LessonId, Material, MaterialId, NewCertificate,
    UserId, UserProfile, ValidatedAnnouncement, ValidatedCourse, ValidatedLesson, sort_roster,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Which unique constraint a write tripped over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueKey {
    /// Another certificate already carries this number.
    CertificateNumber,
    /// The (user, course) pair already holds a certificate.
    CertificateOwner,
    Other(String),
}

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("unique constraint violated: {0:?}")]
    UniqueViolation(UniqueKey),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist or update a user profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError>;

    /// Fetch a user profile; `Ok(None)` when unknown.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, StorageError>;
}

/// Courses, their lesson roster and lesson materials.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UniqueViolation` if the slug is taken.
    async fn insert_course(&self, course: ValidatedCourse) -> Result<Course, StorageError>;

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    async fn get_course_by_slug(&self, slug: &str) -> Result<Option<Course>, StorageError>;

    /// Courses ordered by name.
    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError>;

    async fn insert_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError>;

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// Lesson roster in (number, id) order.
    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError>;

    /// Insert a material; the id on the passed value is ignored.
    async fn insert_material(&self, material: &Material) -> Result<Material, StorageError>;

    async fn list_materials(&self, lesson_id: LessonId) -> Result<Vec<Material>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Create the enrollment for (user, course) or overwrite its status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        status: EnrollmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError>;

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    async fn list_enrollments(
        &self,
        course_id: CourseId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>, StorageError>;
}

/// Per-(user, lesson) completion facts.
#[async_trait]
pub trait LessonCompletionRepository: Send + Sync {
    /// Atomically upsert the completion flag for (user, lesson).
    ///
    /// The timestamp is set on the transition to completed, cleared on the
    /// transition to incomplete, and left alone when the flag does not change.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn set_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StorageError>;

    async fn get_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError>;

    /// Completed records for lessons of the course, in roster order.
    async fn list_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<LessonCompletion>, StorageError>;
}

#[async_trait]
pub trait CourseProgressRepository: Send + Sync {
    /// Create the progress row for the enrollment unless (user, course) has one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn create_progress_if_absent(
        &self,
        enrollment: &Enrollment,
    ) -> Result<CourseProgress, StorageError>;

    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CourseProgress>, StorageError>;

    /// Recount roster and completions and store the derived percentage.
    ///
    /// Runs under mutual exclusion for the (user, course) row so concurrent
    /// recomputes never interleave. `Ok(None)` when no progress row exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if counting or writing fails.
    async fn recompute_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<CourseProgress>, StorageError>;
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Conditional insert guarded by the unique keys.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UniqueViolation(UniqueKey::CertificateOwner)` when
    /// (user, course) already holds a certificate and
    /// `StorageError::UniqueViolation(UniqueKey::CertificateNumber)` on a
    /// number collision.
    async fn insert_certificate(&self, cert: NewCertificate) -> Result<Certificate, StorageError>;

    async fn get_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError>;

    async fn get_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> Result<Option<Certificate>, StorageError>;

    async fn list_certificates(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError>;

    /// Record the document name once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown id and
    /// `StorageError::Conflict` if a document is already attached.
    async fn attach_document(
        &self,
        id: CertificateId,
        document: &str,
    ) -> Result<Certificate, StorageError>;
}

#[async_trait]
pub trait AnnouncementRepository: Send + Sync {
    async fn insert_announcement(
        &self,
        announcement: ValidatedAnnouncement,
    ) -> Result<Announcement, StorageError>;

    async fn get_announcement(
        &self,
        id: AnnouncementId,
    ) -> Result<Option<Announcement>, StorageError>;

    /// Announcements of a course, newest first.
    async fn list_announcements(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Announcement>, StorageError>;

    async fn insert_comment(
        &self,
        announcement_id: AnnouncementId,
        user_id: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError>;

    /// Comments of an announcement, oldest first.
    async fn list_comments(
        &self,
        announcement_id: AnnouncementId,
    ) -> Result<Vec<Comment>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    users: HashMap<UserId, UserProfile>,
    courses: HashMap<CourseId, Course>,
    lessons: HashMap<LessonId, Lesson>,
    materials: Vec<Material>,
    enrollments: HashMap<(UserId, CourseId), Enrollment>,
    completions: HashMap<(UserId, LessonId), LessonCompletion>,
    progress: HashMap<(UserId, CourseId), CourseProgress>,
    certificates: Vec<Certificate>,
    announcements: Vec<Announcement>,
    comments: Vec<Comment>,
}

impl MemoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn roster(&self, course_id: CourseId) -> Vec<Lesson> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        sort_roster(&mut lessons);
        lessons
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All tables share one lock, so every operation is atomic with respect to
/// the others.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn count(len: usize) -> Result<u32, StorageError> {
    u32::try_from(len).map_err(|_| StorageError::Serialization(format!("count overflow: {len}")))
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        self.state()?.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.state()?.users.get(&id).cloned())
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn insert_course(&self, course: ValidatedCourse) -> Result<Course, StorageError> {
        let mut state = self.state()?;
        if state.courses.values().any(|c| c.slug == course.slug) {
            return Err(StorageError::UniqueViolation(UniqueKey::Other(
                "courses.slug".into(),
            )));
        }
        let id = CourseId::new(state.allocate());
        let course = course.assign_id(id);
        state.courses.insert(id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(self.state()?.courses.get(&id).cloned())
    }

    async fn get_course_by_slug(&self, slug: &str) -> Result<Option<Course>, StorageError> {
        Ok(self
            .state()?
            .courses
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let mut courses: Vec<Course> = self.state()?.courses.values().cloned().collect();
        courses.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        courses.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(courses)
    }

    async fn insert_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError> {
        let mut state = self.state()?;
        if !state.courses.contains_key(&lesson.course_id) {
            return Err(StorageError::NotFound);
        }
        let id = LessonId::new(state.allocate());
        let lesson = lesson.assign_id(id);
        state.lessons.insert(id, lesson.clone());
        Ok(lesson)
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        Ok(self.state()?.lessons.get(&id).cloned())
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        Ok(self.state()?.roster(course_id))
    }

    async fn insert_material(&self, material: &Material) -> Result<Material, StorageError> {
        let mut state = self.state()?;
        if !state.lessons.contains_key(&material.lesson_id) {
            return Err(StorageError::NotFound);
        }
        let mut stored = material.clone();
        stored.id = MaterialId::new(state.allocate());
        state.materials.push(stored.clone());
        Ok(stored)
    }

    async fn list_materials(&self, lesson_id: LessonId) -> Result<Vec<Material>, StorageError> {
        Ok(self
            .state()?
            .materials
            .iter()
            .filter(|m| m.lesson_id == lesson_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn upsert_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        status: EnrollmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let mut state = self.state()?;
        if let Some(existing) = state.enrollments.get_mut(&(user_id, course_id)) {
            existing.set_status(status, now);
            return Ok(existing.clone());
        }
        let enrollment = Enrollment {
            id: EnrollmentId::new(state.allocate()),
            user_id,
            course_id,
            status,
            created_at: now,
            updated_at: now,
        };
        state
            .enrollments
            .insert((user_id, course_id), enrollment.clone());
        Ok(enrollment)
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(self.state()?.enrollments.get(&(user_id, course_id)).cloned())
    }

    async fn list_enrollments(
        &self,
        course_id: CourseId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let mut out: Vec<Enrollment> = self
            .state()?
            .enrollments
            .values()
            .filter(|e| e.course_id == course_id && e.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }
}

#[async_trait]
impl LessonCompletionRepository for InMemoryRepository {
    async fn set_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StorageError> {
        let mut state = self.state()?;
        if !state.lessons.contains_key(&lesson_id) {
            return Err(StorageError::NotFound);
        }
        let entry = state
            .completions
            .entry((user_id, lesson_id))
            .or_insert_with(|| LessonCompletion::not_started(user_id, lesson_id));
        entry.set_completed(completed, now);
        Ok(entry.clone())
    }

    async fn get_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        Ok(self.state()?.completions.get(&(user_id, lesson_id)).cloned())
    }

    async fn list_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        let state = self.state()?;
        Ok(state
            .roster(course_id)
            .iter()
            .filter_map(|lesson| state.completions.get(&(user_id, lesson.id)))
            .filter(|c| c.completed())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CourseProgressRepository for InMemoryRepository {
    async fn create_progress_if_absent(
        &self,
        enrollment: &Enrollment,
    ) -> Result<CourseProgress, StorageError> {
        let mut state = self.state()?;
        let key = (enrollment.user_id, enrollment.course_id);
        if let Some(existing) = state.progress.get(&key) {
            return Ok(existing.clone());
        }
        let progress = CourseProgress::new(
            CourseProgressId::new(state.allocate()),
            enrollment.user_id,
            enrollment.course_id,
            enrollment.id,
        );
        state.progress.insert(key, progress.clone());
        Ok(progress)
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        Ok(self.state()?.progress.get(&(user_id, course_id)).cloned())
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CourseProgress>, StorageError> {
        let mut out: Vec<CourseProgress> = self
            .state()?
            .progress
            .values()
            .filter(|p| p.user_id() == user_id)
            .cloned()
            .collect();
        out.sort_by_key(CourseProgress::id);
        Ok(out)
    }

    async fn recompute_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let mut state = self.state()?;
        if !state.progress.contains_key(&(user_id, course_id)) {
            return Ok(None);
        }
        let roster = state.roster(course_id);
        let total = count(roster.len())?;
        let completed = count(
            roster
                .iter()
                .filter(|l| {
                    state
                        .completions
                        .get(&(user_id, l.id))
                        .is_some_and(LessonCompletion::completed)
                })
                .count(),
        )?;

        let Some(progress) = state.progress.get_mut(&(user_id, course_id)) else {
            return Ok(None);
        };
        progress
            .apply_counts(completed, total, now)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(progress.clone()))
    }
}

#[async_trait]
impl CertificateRepository for InMemoryRepository {
    async fn insert_certificate(&self, cert: NewCertificate) -> Result<Certificate, StorageError> {
        let mut state = self.state()?;
        if state
            .certificates
            .iter()
            .any(|c| c.user_id() == cert.user_id && c.course_id() == cert.course_id)
        {
            return Err(StorageError::UniqueViolation(UniqueKey::CertificateOwner));
        }
        if state.certificates.iter().any(|c| *c.number() == cert.number) {
            return Err(StorageError::UniqueViolation(UniqueKey::CertificateNumber));
        }
        let stored = cert.assign_id(CertificateId::new(state.allocate()));
        state.certificates.push(stored.clone());
        Ok(stored)
    }

    async fn get_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        Ok(self
            .state()?
            .certificates
            .iter()
            .find(|c| c.user_id() == user_id && c.course_id() == course_id)
            .cloned())
    }

    async fn get_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> Result<Option<Certificate>, StorageError> {
        Ok(self
            .state()?
            .certificates
            .iter()
            .find(|c| c.number() == number)
            .cloned())
    }

    async fn list_certificates(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError> {
        Ok(self
            .state()?
            .certificates
            .iter()
            .filter(|c| c.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn attach_document(
        &self,
        id: CertificateId,
        document: &str,
    ) -> Result<Certificate, StorageError> {
        let mut state = self.state()?;
        let cert = state
            .certificates
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(StorageError::NotFound)?;
        cert.attach_document(document)
            .map_err(|_| StorageError::Conflict)?;
        Ok(cert.clone())
    }
}

#[async_trait]
impl AnnouncementRepository for InMemoryRepository {
    async fn insert_announcement(
        &self,
        announcement: ValidatedAnnouncement,
    ) -> Result<Announcement, StorageError> {
        let mut state = self.state()?;
        if !state.courses.contains_key(&announcement.course_id) {
            return Err(StorageError::NotFound);
        }
        let stored = announcement.assign_id(AnnouncementId::new(state.allocate()));
        state.announcements.push(stored.clone());
        Ok(stored)
    }

    async fn get_announcement(
        &self,
        id: AnnouncementId,
    ) -> Result<Option<Announcement>, StorageError> {
        Ok(self
            .state()?
            .announcements
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_announcements(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Announcement>, StorageError> {
        let mut out: Vec<Announcement> = self
            .state()?
            .announcements
            .iter()
            .filter(|a| a.course_id == course_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn insert_comment(
        &self,
        announcement_id: AnnouncementId,
        user_id: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError> {
        let mut state = self.state()?;
        if !state.announcements.iter().any(|a| a.id == announcement_id) {
            return Err(StorageError::NotFound);
        }
        let comment = Comment {
            id: CommentId::new(state.allocate()),
            announcement_id,
            user_id,
            text: text.to_owned(),
            created_at: now,
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(
        &self,
        announcement_id: AnnouncementId,
    ) -> Result<Vec<Comment>, StorageError> {
        let mut out: Vec<Comment> = self
            .state()?
            .comments
            .iter()
            .filter(|c| c.announcement_id == announcement_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

//
// ─── STORAGE BUNDLE ────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub courses: Arc<dyn CourseRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub completions: Arc<dyn LessonCompletionRepository>,
    pub progress: Arc<dyn CourseProgressRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub announcements: Arc<dyn AnnouncementRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(&InMemoryRepository::new())
    }

    pub(crate) fn from_repo<R>(repo: &R) -> Self
    where
        R: UserRepository
            + CourseRepository
            + EnrollmentRepository
            + LessonCompletionRepository
            + CourseProgressRepository
            + CertificateRepository
            + AnnouncementRepository
            + Clone
            + 'static,
    {
        Self {
            users: Arc::new(repo.clone()),
            courses: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            certificates: Arc::new(repo.clone()),
            announcements: Arc::new(repo.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CertificateNumber, CourseDraft, LessonDraft};
    use course_core::time::fixed_now;
    use chrono::Duration;

    async fn course_with_lessons(repo: &InMemoryRepository, n: i32) -> (Course, Vec<Lesson>) {
        let course = repo
            .insert_course(CourseDraft::named("Rust Basics").validate(fixed_now()).unwrap())
            .await
            .unwrap();
        let mut lessons = Vec::new();
        for number in 1..=n {
            let lesson = LessonDraft::new(course.id, format!("Lesson {number}"), number)
                .validate(fixed_now())
                .unwrap();
            lessons.push(repo.insert_lesson(lesson).await.unwrap());
        }
        (course, lessons)
    }

    #[tokio::test]
    async fn set_completed_only_moves_timestamp_on_transition() {
        let repo = InMemoryRepository::new();
        let (_, lessons) = course_with_lessons(&repo, 1).await;
        let user = UserId::new(7);
        let now = fixed_now();

        let first = repo.set_completed(user, lessons[0].id, true, now).await.unwrap();
        let again = repo
            .set_completed(user, lessons[0].id, true, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(first.completed_at(), Some(now));
        assert_eq!(again.completed_at(), Some(now));

        let cleared = repo.set_completed(user, lessons[0].id, false, now).await.unwrap();
        assert!(!cleared.completed());
        assert!(cleared.completed_at().is_none());
    }

    #[tokio::test]
    async fn recompute_without_progress_row_is_none() {
        let repo = InMemoryRepository::new();
        let (course, _) = course_with_lessons(&repo, 2).await;
        let res = repo
            .recompute_progress(UserId::new(1), course.id, fixed_now())
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn certificate_unique_keys_are_distinguished() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = course_with_lessons(&repo, 1).await;
        let now = fixed_now();
        let user = UserId::new(1);
        let enrollment = repo
            .upsert_enrollment(user, course.id, EnrollmentStatus::Approved, now)
            .await
            .unwrap();
        repo.create_progress_if_absent(&enrollment).await.unwrap();
        repo.set_completed(user, lessons[0].id, true, now).await.unwrap();
        let progress = repo
            .recompute_progress(user, course.id, now)
            .await
            .unwrap()
            .unwrap();

        let number = CertificateNumber::derive(user, course.id, now);
        let cert = NewCertificate::for_progress(&progress, number.clone(), now).unwrap();
        repo.insert_certificate(cert.clone()).await.unwrap();

        let err = repo.insert_certificate(cert).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::UniqueViolation(UniqueKey::CertificateOwner)
        ));

        let by_number = repo.get_certificate_by_number(&number).await.unwrap();
        assert!(by_number.is_some());
    }
}
