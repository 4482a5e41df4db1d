use std::sync::Arc;

use course_core::model::{CourseId, Enrollment, EnrollmentStatus, UserId};
use storage::repository::{CourseRepository, EnrollmentRepository};
use tracing::info;

use crate::Clock;
use crate::aggregator::ProgressAggregator;
use crate::error::{EnrollmentServiceError, Missing};

/// Enrollment approval and cancellation.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    aggregator: ProgressAggregator,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        aggregator: ProgressAggregator,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
            aggregator,
        }
    }

    /// Approve the user's enrollment, creating it if needed, and make sure a
    /// progress row exists.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::NotFound` for an unknown course and
    /// `EnrollmentServiceError::Storage` / `Progress` on persistence failures.
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        if self.courses.get_course(course_id).await?.is_none() {
            return Err(EnrollmentServiceError::NotFound(Missing::Course(course_id)));
        }
        let enrollment = self
            .enrollments
            .upsert_enrollment(user_id, course_id, EnrollmentStatus::Approved, self.clock.now())
            .await?;
        let progress = self.aggregator.initialize(&enrollment).await?;
        info!(
            user_id = %user_id,
            course_id = %course_id,
            enrollment_id = %enrollment.id,
            percentage = progress.percentage(),
            "enrollment approved"
        );
        Ok(enrollment)
    }

    /// Mark the enrollment cancelled. Progress and certificates are kept.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::NotFound` when the user was never
    /// enrolled and `EnrollmentServiceError::Storage` on persistence failures.
    pub async fn cancel(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        if self
            .enrollments
            .get_enrollment(user_id, course_id)
            .await?
            .is_none()
        {
            return Err(EnrollmentServiceError::NotFound(Missing::Enrollment {
                user: user_id,
                course: course_id,
            }));
        }
        let enrollment = self
            .enrollments
            .upsert_enrollment(user_id, course_id, EnrollmentStatus::Cancelled, self.clock.now())
            .await?;
        info!(user_id = %user_id, course_id = %course_id, "enrollment cancelled");
        Ok(enrollment)
    }

    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn is_enrolled(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, EnrollmentServiceError> {
        Ok(self
            .enrollments
            .get_enrollment(user_id, course_id)
            .await?
            .is_some_and(|e| e.is_approved()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::CourseDraft;
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::{CourseProgressRepository, InMemoryRepository};

    #[tokio::test]
    async fn enroll_cancel_and_reenroll_keep_one_progress_row() {
        let repo = InMemoryRepository::new();
        let course = repo
            .insert_course(CourseDraft::named("Rust").validate(fixed_now()).unwrap())
            .await
            .unwrap();
        let aggregator = ProgressAggregator::new(fixed_clock(), Arc::new(repo.clone()));
        let service = EnrollmentService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            aggregator,
        );
        let user = UserId::new(3);

        let first = service.enroll(user, course.id).await.unwrap();
        assert!(service.is_enrolled(user, course.id).await.unwrap());

        service.cancel(user, course.id).await.unwrap();
        assert!(!service.is_enrolled(user, course.id).await.unwrap());

        let again = service.enroll(user, course.id).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(repo.list_progress(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_course_and_missing_enrollment_are_not_found() {
        let repo = InMemoryRepository::new();
        let aggregator = ProgressAggregator::new(fixed_clock(), Arc::new(repo.clone()));
        let service = EnrollmentService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo),
            aggregator,
        );
        assert!(matches!(
            service.enroll(UserId::new(1), CourseId::new(42)).await,
            Err(EnrollmentServiceError::NotFound(Missing::Course(_)))
        ));
        assert!(matches!(
            service.cancel(UserId::new(1), CourseId::new(42)).await,
            Err(EnrollmentServiceError::NotFound(Missing::Enrollment { .. }))
        ));
    }
}
