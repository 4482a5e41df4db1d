use chrono::{DateTime, Utc};
use course_core::model::{CourseId, CourseProgress, Enrollment, UserId};
use sqlx::SqliteConnection;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{conn, count_u32, id_i64, map_progress_row, ser, write_err};
use crate::repository::{CourseProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "id, user_id, course_id, enrollment_id, completed_lessons, \
     total_lessons, percentage, completed_at";

async fn select_progress(
    db: &mut SqliteConnection,
    user_id: i64,
    course_id: i64,
) -> Result<Option<CourseProgress>, StorageError> {
    let row = sqlx::query(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM course_progress WHERE user_id = ?1 AND course_id = ?2"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *db)
    .await
    .map_err(conn)?;
    row.as_ref().map(map_progress_row).transpose()
}

/// Counting and writing, run while the write lock is held.
async fn recompute_locked(
    db: &mut SqliteConnection,
    user_id: i64,
    course_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<CourseProgress>, StorageError> {
    let Some(mut progress) = select_progress(db, user_id, course_id).await? else {
        return Ok(None);
    };

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = ?1")
        .bind(course_id)
        .fetch_one(&mut *db)
        .await
        .map_err(conn)?;
    let completed: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*)
        FROM lesson_completions lc
        JOIN lessons l ON l.id = lc.lesson_id
        WHERE lc.user_id = ?1 AND l.course_id = ?2 AND lc.completed = 1
        ",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *db)
    .await
    .map_err(conn)?;

    progress
        .apply_counts(
            count_u32("completed_lessons", completed)?,
            count_u32("total_lessons", total)?,
            now,
        )
        .map_err(ser)?;

    sqlx::query(
        r"
        UPDATE course_progress
        SET completed_lessons = ?2, total_lessons = ?3, percentage = ?4, completed_at = ?5
        WHERE id = ?1
        ",
    )
    .bind(id_i64("course_progress_id", progress.id().value())?)
    .bind(i64::from(progress.completed_lessons()))
    .bind(i64::from(progress.total_lessons()))
    .bind(progress.percentage())
    .bind(progress.completed_at())
    .execute(&mut *db)
    .await
    .map_err(write_err)?;

    Ok(Some(progress))
}

#[async_trait::async_trait]
impl CourseProgressRepository for SqliteRepository {
    async fn create_progress_if_absent(
        &self,
        enrollment: &Enrollment,
    ) -> Result<CourseProgress, StorageError> {
        let user_id = id_i64("user_id", enrollment.user_id.value())?;
        let course_id = id_i64("course_id", enrollment.course_id.value())?;
        sqlx::query(
            r"
            INSERT INTO course_progress (user_id, course_id, enrollment_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(id_i64("enrollment_id", enrollment.id.value())?)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let mut db = self.pool.acquire().await.map_err(conn)?;
        select_progress(&mut db, user_id, course_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        select_progress(
            &mut db,
            id_i64("user_id", user_id.value())?,
            id_i64("course_id", course_id.value())?,
        )
        .await
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CourseProgress>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM course_progress WHERE user_id = ?1 ORDER BY id ASC"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }

    async fn recompute_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let course = id_i64("course_id", course_id.value())?;

        // IMMEDIATE takes the database write lock up front, serializing
        // concurrent recomputes instead of failing them at upgrade time.
        // Dropping `tx` before commit rolls back.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(conn)?;

        let progress = match recompute_locked(&mut tx, user, course, now).await {
            Ok(progress) => progress,
            Err(err) => {
                debug!(error = %err, "progress recompute failed");
                return Err(err);
            }
        };
        tx.commit().await.map_err(conn)?;
        debug!(
            user_id = %user_id,
            course_id = %course_id,
            percentage = progress.as_ref().map(CourseProgress::percentage),
            "progress recomputed"
        );
        Ok(progress)
    }
}
