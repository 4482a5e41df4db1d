use std::sync::Arc;

use course_core::model::{CourseId, CourseProgress, Enrollment, UserId};
use storage::repository::CourseProgressRepository;
use tracing::debug;

use crate::Clock;
use crate::error::ProgressError;

/// Derives course percentages from stored completion facts.
#[derive(Clone)]
pub struct ProgressAggregator {
    clock: Clock,
    progress: Arc<dyn CourseProgressRepository>,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn CourseProgressRepository>) -> Self {
        Self { clock, progress }
    }

    /// Recount and persist progress for (user, course).
    ///
    /// Returns `Ok(None)` when the user has no progress row for the course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if counting or writing fails.
    pub async fn recompute(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, ProgressError> {
        let progress = self
            .progress
            .recompute_progress(user_id, course_id, self.clock.now())
            .await?;
        Ok(progress)
    }

    /// Create the progress row for an enrollment if absent, then recompute.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the row cannot be created or
    /// recomputed.
    pub async fn initialize(&self, enrollment: &Enrollment) -> Result<CourseProgress, ProgressError> {
        let created = self.progress.create_progress_if_absent(enrollment).await?;
        debug!(
            user_id = %enrollment.user_id,
            course_id = %enrollment.course_id,
            progress_id = %created.id(),
            "progress row ensured"
        );
        let recomputed = self
            .recompute(enrollment.user_id, enrollment.course_id)
            .await?;
        Ok(recomputed.unwrap_or(created))
    }

    /// Recompute every progress row of the user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if any recompute fails.
    pub async fn recompute_all(&self, user_id: UserId) -> Result<Vec<CourseProgress>, ProgressError> {
        let rows = self.progress.list_progress(user_id).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(fresh) = self.recompute(user_id, row.course_id()).await? {
                out.push(fresh);
            }
        }
        Ok(out)
    }
}
