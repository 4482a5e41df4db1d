use chrono::{DateTime, Utc};
use course_core::model::{
    Announcement, AnnouncementId, Comment, CourseId, UserId, ValidatedAnnouncement,
};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_announcement_row, map_comment_row, write_err};
use crate::repository::{AnnouncementRepository, StorageError};

#[async_trait::async_trait]
impl AnnouncementRepository for SqliteRepository {
    async fn insert_announcement(
        &self,
        announcement: ValidatedAnnouncement,
    ) -> Result<Announcement, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO announcements (course_id, title, content, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("course_id", announcement.course_id.value())?)
        .bind(&announcement.title)
        .bind(&announcement.content)
        .bind(announcement.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("announcement_id sign overflow".into()))?;
        Ok(announcement.assign_id(AnnouncementId::new(id)))
    }

    async fn get_announcement(
        &self,
        id: AnnouncementId,
    ) -> Result<Option<Announcement>, StorageError> {
        let row = sqlx::query(
            "SELECT id, course_id, title, content, created_at FROM announcements WHERE id = ?1",
        )
        .bind(id_i64("announcement_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_announcement_row).transpose()
    }

    async fn list_announcements(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Announcement>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, content, created_at
            FROM announcements
            WHERE course_id = ?1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_announcement_row).collect()
    }

    async fn insert_comment(
        &self,
        announcement_id: AnnouncementId,
        user_id: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO comments (announcement_id, user_id, text, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, announcement_id, user_id, text, created_at
            ",
        )
        .bind(id_i64("announcement_id", announcement_id.value())?)
        .bind(id_i64("user_id", user_id.value())?)
        .bind(text)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;
        map_comment_row(&row)
    }

    async fn list_comments(
        &self,
        announcement_id: AnnouncementId,
    ) -> Result<Vec<Comment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, announcement_id, user_id, text, created_at
            FROM comments
            WHERE announcement_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(id_i64("announcement_id", announcement_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_comment_row).collect()
    }
}
