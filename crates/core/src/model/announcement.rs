use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::course::MAX_NAME_LEN;
use crate::model::ids::{AnnouncementId, CommentId, CourseId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnnouncementError {
    #[error("announcement title cannot be empty")]
    EmptyTitle,
    #[error("announcement title is longer than {MAX_NAME_LEN} characters")]
    TitleTooLong,
    #[error("announcement content cannot be empty")]
    EmptyContent,
    #[error("comment cannot be empty")]
    EmptyComment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementDraft {
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
}

impl AnnouncementDraft {
    /// # Errors
    ///
    /// Returns `AnnouncementError` for a blank or oversized title, or blank content.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedAnnouncement, AnnouncementError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(AnnouncementError::EmptyTitle);
        }
        if title.chars().count() > MAX_NAME_LEN {
            return Err(AnnouncementError::TitleTooLong);
        }
        if self.content.trim().is_empty() {
            return Err(AnnouncementError::EmptyContent);
        }
        Ok(ValidatedAnnouncement {
            course_id: self.course_id,
            title,
            content: self.content,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAnnouncement {
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ValidatedAnnouncement {
    #[must_use]
    pub fn assign_id(self, id: AnnouncementId) -> Announcement {
        Announcement {
            id,
            course_id: self.course_id,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub announcement_id: AnnouncementId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Trims comment text and rejects blank input.
///
/// # Errors
///
/// Returns `AnnouncementError::EmptyComment` when nothing is left after trimming.
pub fn comment_text(raw: &str) -> Result<String, AnnouncementError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AnnouncementError::EmptyComment);
    }
    Ok(text.to_owned())
}
