use chrono::{DateTime, Utc};
use course_core::model::{CourseId, LessonCompletion, LessonId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_completion_row, write_err};
use crate::repository::{LessonCompletionRepository, StorageError};

#[async_trait::async_trait]
impl LessonCompletionRepository for SqliteRepository {
    async fn set_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonCompletion, StorageError> {
        // SET expressions see the pre-update row, so the CASE compares the old
        // flag against the requested one.
        let row = sqlx::query(
            r"
            INSERT INTO lesson_completions (user_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                completed = excluded.completed,
                completed_at = CASE
                    WHEN lesson_completions.completed = excluded.completed
                        THEN lesson_completions.completed_at
                    ELSE excluded.completed_at
                END
            RETURNING user_id, lesson_id, completed, completed_at
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .bind(completed)
        .bind(completed.then_some(now))
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;
        map_completion_row(&row)
    }

    async fn get_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, lesson_id, completed, completed_at
            FROM lesson_completions
            WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_completion_row).transpose()
    }

    async fn list_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<LessonCompletion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lc.user_id, lc.lesson_id, lc.completed, lc.completed_at
            FROM lesson_completions lc
            JOIN lessons l ON l.id = lc.lesson_id
            WHERE lc.user_id = ?1 AND l.course_id = ?2 AND lc.completed = 1
            ORDER BY l.number ASC, l.id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_completion_row).collect()
    }
}
