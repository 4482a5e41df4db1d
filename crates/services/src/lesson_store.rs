use std::sync::Arc;

use course_core::model::{CourseId, LessonCompletion, LessonId, UserId};
use storage::repository::{LessonCompletionRepository, StorageError};

use crate::Clock;
use crate::error::{Missing, ProgressError};

/// Per-(user, lesson) completion facts.
#[derive(Clone)]
pub struct LessonCompletionStore {
    clock: Clock,
    completions: Arc<dyn LessonCompletionRepository>,
}

impl LessonCompletionStore {
    #[must_use]
    pub fn new(clock: Clock, completions: Arc<dyn LessonCompletionRepository>) -> Self {
        Self { clock, completions }
    }

    /// Upsert the completion flag. Repeating the current state keeps the
    /// original timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for an unknown lesson and
    /// `ProgressError::Storage` if the write fails.
    pub async fn set_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
    ) -> Result<LessonCompletion, ProgressError> {
        self.completions
            .set_completed(user_id, lesson_id, completed, self.clock.now())
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ProgressError::NotFound(Missing::Lesson(lesson_id)),
                other => ProgressError::Storage(other),
            })
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn get(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, ProgressError> {
        Ok(self.completions.get_completion(user_id, lesson_id).await?)
    }

    /// Completed lessons of the course in roster order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn list_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<LessonCompletion>, ProgressError> {
        Ok(self.completions.list_completed(user_id, course_id).await?)
    }
}
