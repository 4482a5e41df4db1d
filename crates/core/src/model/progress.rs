use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{CourseId, CourseProgressId, EnrollmentId, LessonId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("incomplete lesson cannot carry a completion timestamp")]
    TimestampOnIncomplete,

    #[error("completed lessons ({completed}) exceed total lessons ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },

    #[error("percentage out of range: {0}")]
    PercentageOutOfRange(f64),
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Share of completed lessons as a percentage, at full precision.
///
/// A course without lessons is 0% complete.
#[must_use]
pub fn progress_percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * f64::from(completed) / f64::from(total)
}

//
// ─── LESSON COMPLETION ─────────────────────────────────────────────────────────
//

/// One user's completion state for one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonCompletion {
    user_id: UserId,
    lesson_id: LessonId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonCompletion {
    /// The implicit state of a lesson nobody has touched yet.
    #[must_use]
    pub fn not_started(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: false,
            completed_at: None,
        }
    }

    /// Rehydrate a completion record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::TimestampOnIncomplete` if an incomplete record
    /// carries a timestamp.
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if !completed && completed_at.is_some() {
            return Err(ProgressError::TimestampOnIncomplete);
        }
        Ok(Self {
            user_id,
            lesson_id,
            completed,
            completed_at,
        })
    }

    /// Toggle the completion flag. Returns `true` when the state changed.
    ///
    /// The timestamp only moves on a transition edge; repeating the current
    /// state leaves it untouched.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) -> bool {
        if self.completed == completed {
            return false;
        }
        self.completed = completed;
        self.completed_at = completed.then_some(now);
        true
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// Aggregate standing of one user in one course.
///
/// `completed_at` is set the first time the percentage reaches 100 and is
/// never cleared afterwards, even if a lesson is later un-completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgress {
    id: CourseProgressId,
    user_id: UserId,
    course_id: CourseId,
    enrollment_id: EnrollmentId,
    completed_lessons: u32,
    total_lessons: u32,
    percentage: f64,
    completed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// Fresh progress row with zero counts.
    #[must_use]
    pub fn new(
        id: CourseProgressId,
        user_id: UserId,
        course_id: CourseId,
        enrollment_id: EnrollmentId,
    ) -> Self {
        Self {
            id,
            user_id,
            course_id,
            enrollment_id,
            completed_lessons: 0,
            total_lessons: 0,
            percentage: 0.0,
            completed_at: None,
        }
    }

    /// Rehydrate a progress row from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if counts or percentage are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: CourseProgressId,
        user_id: UserId,
        course_id: CourseId,
        enrollment_id: EnrollmentId,
        completed_lessons: u32,
        total_lessons: u32,
        percentage: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if completed_lessons > total_lessons {
            return Err(ProgressError::CompletedExceedsTotal {
                completed: completed_lessons,
                total: total_lessons,
            });
        }
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(ProgressError::PercentageOutOfRange(percentage));
        }
        Ok(Self {
            id,
            user_id,
            course_id,
            enrollment_id,
            completed_lessons,
            total_lessons,
            percentage,
            completed_at,
        })
    }

    /// Overwrite counts with freshly counted values and derive the percentage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CompletedExceedsTotal` when `completed > total`.
    pub fn apply_counts(
        &mut self,
        completed: u32,
        total: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if completed > total {
            return Err(ProgressError::CompletedExceedsTotal { completed, total });
        }
        self.completed_lessons = completed;
        self.total_lessons = total;
        self.percentage = progress_percentage(completed, total);
        if self.is_complete() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.percentage >= 100.0
    }

    #[must_use]
    pub fn id(&self) -> CourseProgressId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn enrollment_id(&self) -> EnrollmentId {
        self.enrollment_id
    }

    #[must_use]
    pub fn completed_lessons(&self) -> u32 {
        self.completed_lessons
    }

    #[must_use]
    pub fn total_lessons(&self) -> u32 {
        self.total_lessons
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn progress() -> CourseProgress {
        CourseProgress::new(
            CourseProgressId::new(1),
            UserId::new(1),
            CourseId::new(1),
            EnrollmentId::new(1),
        )
    }

    #[test]
    fn zero_lessons_is_zero_percent() {
        assert_eq!(progress_percentage(0, 0), 0.0);
    }

    #[test]
    fn full_roster_is_exactly_one_hundred() {
        for n in 1..=250 {
            assert_eq!(progress_percentage(n, n), 100.0, "n = {n}");
        }
    }

    #[test]
    fn thirds_are_not_rounded() {
        let p = progress_percentage(1, 3);
        assert!((p - 33.333_333).abs() < 1e-5);
        assert!((progress_percentage(2, 3) - 66.666_667).abs() < 1e-5);
    }

    #[test]
    fn repeated_completion_keeps_timestamp() {
        let now = fixed_now();
        let mut c = LessonCompletion::not_started(UserId::new(1), LessonId::new(1));
        assert!(c.set_completed(true, now));
        assert!(!c.set_completed(true, now + Duration::hours(1)));
        assert_eq!(c.completed_at(), Some(now));
    }

    #[test]
    fn uncompleting_clears_timestamp() {
        let now = fixed_now();
        let mut c = LessonCompletion::not_started(UserId::new(1), LessonId::new(1));
        c.set_completed(true, now);
        assert!(c.set_completed(false, now));
        assert!(c.completed_at().is_none());
    }

    #[test]
    fn persisted_incomplete_with_timestamp_is_rejected() {
        let err = LessonCompletion::from_persisted(
            UserId::new(1),
            LessonId::new(1),
            false,
            Some(fixed_now()),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::TimestampOnIncomplete);
    }

    #[test]
    fn completed_at_is_set_once_and_never_cleared() {
        let now = fixed_now();
        let mut p = progress();
        p.apply_counts(2, 2, now).unwrap();
        assert_eq!(p.completed_at(), Some(now));

        p.apply_counts(1, 2, now + Duration::days(1)).unwrap();
        assert_eq!(p.percentage(), 50.0);
        assert_eq!(p.completed_at(), Some(now));

        p.apply_counts(2, 2, now + Duration::days(2)).unwrap();
        assert_eq!(p.completed_at(), Some(now));
    }

    #[test]
    fn counts_above_total_are_rejected() {
        let mut p = progress();
        let err = p.apply_counts(3, 2, fixed_now()).unwrap_err();
        assert_eq!(
            err,
            ProgressError::CompletedExceedsTotal {
                completed: 3,
                total: 2
            }
        );
        assert_eq!(p.total_lessons(), 0);
    }

    #[test]
    fn empty_course_never_completes() {
        let mut p = progress();
        p.apply_counts(0, 0, fixed_now()).unwrap();
        assert_eq!(p.percentage(), 0.0);
        assert!(!p.is_complete());
        assert!(p.completed_at().is_none());
    }
}
