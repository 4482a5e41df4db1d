use std::sync::Arc;

use course_core::model::{
    Announcement, AnnouncementDraft, AnnouncementId, Comment, CourseId, EnrollmentStatus, UserId,
    comment_text,
};
use storage::repository::{AnnouncementRepository, CourseRepository, EnrollmentRepository};
use tracing::info;

use crate::Clock;
use crate::error::{AnnouncementServiceError, Missing};

/// Course announcements and their comment threads.
#[derive(Clone)]
pub struct AnnouncementService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    announcements: Arc<dyn AnnouncementRepository>,
}

impl AnnouncementService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        announcements: Arc<dyn AnnouncementRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
            announcements,
        }
    }

    /// # Errors
    ///
    /// Returns `AnnouncementServiceError::Announcement` for validation
    /// failures, `AnnouncementServiceError::NotFound` for an unknown course and
    /// `AnnouncementServiceError::Storage` if persistence fails.
    pub async fn post(
        &self,
        draft: AnnouncementDraft,
    ) -> Result<Announcement, AnnouncementServiceError> {
        let course_id = draft.course_id;
        if self.courses.get_course(course_id).await?.is_none() {
            return Err(AnnouncementServiceError::NotFound(Missing::Course(course_id)));
        }
        let validated = draft.validate(self.clock.now())?;
        let announcement = self.announcements.insert_announcement(validated).await?;
        info!(
            course_id = %course_id,
            announcement_id = %announcement.id,
            recipients = self.recipients(course_id).await?.len(),
            "announcement posted"
        );
        Ok(announcement)
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementServiceError::Storage` if repository access fails.
    pub async fn list(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Announcement>, AnnouncementServiceError> {
        Ok(self.announcements.list_announcements(course_id).await?)
    }

    /// Comment on an announcement; only approved students of its course may.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementServiceError::NotFound` for an unknown
    /// announcement, `AnnouncementServiceError::Unauthorized` without an
    /// approved enrollment and `AnnouncementServiceError::Announcement` for an
    /// empty comment.
    pub async fn comment(
        &self,
        user_id: UserId,
        announcement_id: AnnouncementId,
        text: &str,
    ) -> Result<Comment, AnnouncementServiceError> {
        let announcement = self
            .announcements
            .get_announcement(announcement_id)
            .await?
            .ok_or(AnnouncementServiceError::NotFound(Missing::Announcement(
                announcement_id,
            )))?;
        let approved = self
            .enrollments
            .get_enrollment(user_id, announcement.course_id)
            .await?
            .is_some_and(|e| e.is_approved());
        if !approved {
            return Err(AnnouncementServiceError::Unauthorized);
        }
        let text = comment_text(text)?;
        Ok(self
            .announcements
            .insert_comment(announcement_id, user_id, &text, self.clock.now())
            .await?)
    }

    /// Oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementServiceError::Storage` if repository access fails.
    pub async fn comments(
        &self,
        announcement_id: AnnouncementId,
    ) -> Result<Vec<Comment>, AnnouncementServiceError> {
        Ok(self.announcements.list_comments(announcement_id).await?)
    }

    /// Users who should hear about new announcements of the course.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementServiceError::Storage` if repository access fails.
    pub async fn recipients(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<UserId>, AnnouncementServiceError> {
        Ok(self
            .enrollments
            .list_enrollments(course_id, EnrollmentStatus::Approved)
            .await?
            .into_iter()
            .map(|e| e.user_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::Clock;
    use course_core::model::CourseDraft;
    use course_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    async fn setup() -> (InMemoryRepository, CourseId) {
        let repo = InMemoryRepository::new();
        let course = repo
            .insert_course(CourseDraft::named("Rust").validate(fixed_now()).unwrap())
            .await
            .unwrap();
        (repo, course.id)
    }

    fn service(repo: &InMemoryRepository, clock: Clock) -> AnnouncementService {
        AnnouncementService::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    fn draft(course_id: CourseId, title: &str) -> AnnouncementDraft {
        AnnouncementDraft {
            course_id,
            title: title.into(),
            content: "body".into(),
        }
    }

    #[tokio::test]
    async fn only_approved_students_comment() {
        let (repo, course) = setup().await;
        let svc = service(&repo, Clock::fixed(fixed_now()));
        let post = svc.post(draft(course, "Welcome")).await.unwrap();

        let outsider = svc.comment(UserId::new(9), post.id, "hi").await.unwrap_err();
        assert!(matches!(outsider, AnnouncementServiceError::Unauthorized));

        repo.upsert_enrollment(UserId::new(1), course, EnrollmentStatus::Pending, fixed_now())
            .await
            .unwrap();
        let pending = svc.comment(UserId::new(1), post.id, "hi").await.unwrap_err();
        assert!(matches!(pending, AnnouncementServiceError::Unauthorized));

        repo.upsert_enrollment(UserId::new(1), course, EnrollmentStatus::Approved, fixed_now())
            .await
            .unwrap();
        let comment = svc.comment(UserId::new(1), post.id, "  hi  ").await.unwrap();
        assert_eq!(comment.text, "hi");
        assert_eq!(svc.recipients(course).await.unwrap(), vec![UserId::new(1)]);
    }

    #[tokio::test]
    async fn listing_orders_newest_announcement_first() {
        let (repo, course) = setup().await;
        let first = service(&repo, Clock::fixed(fixed_now()))
            .post(draft(course, "First"))
            .await
            .unwrap();
        let second = service(&repo, Clock::fixed(fixed_now() + Duration::days(1)))
            .post(draft(course, "Second"))
            .await
            .unwrap();

        let listed = service(&repo, Clock::fixed(fixed_now())).list(course).await.unwrap();
        assert_eq!(listed, vec![second, first]);
    }
}
