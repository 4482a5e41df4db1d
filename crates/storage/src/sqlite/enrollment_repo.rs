use chrono::{DateTime, Utc};
use course_core::model::{CourseId, Enrollment, EnrollmentStatus, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_enrollment_row, write_err};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn upsert_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        status: EnrollmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO enrollments (user_id, course_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                status = excluded.status,
                updated_at = CASE
                    WHEN enrollments.status = excluded.status THEN enrollments.updated_at
                    ELSE excluded.updated_at
                END
            RETURNING id, user_id, course_id, status, created_at, updated_at
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .bind(status.code())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;
        map_enrollment_row(&row)
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, course_id, status, created_at, updated_at
            FROM enrollments
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn list_enrollments(
        &self,
        course_id: CourseId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, course_id, status, created_at, updated_at
            FROM enrollments
            WHERE course_id = ?1 AND status = ?2
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("course_id", course_id.value())?)
        .bind(status.code())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_enrollment_row).collect()
    }
}
