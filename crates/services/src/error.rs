//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use course_core::model::{
    AnnouncementError, AnnouncementId, CertificateNumber, CourseError, CourseId, LessonId, UserId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::certificates::RenderError;

/// What a `NotFound` error was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Missing {
    Lesson(LessonId),
    Course(CourseId),
    User(UserId),
    Enrollment { user: UserId, course: CourseId },
    Certificate { user: UserId, course: CourseId },
    Document { user: UserId, course: CourseId },
    CertificateNumber(String),
    Announcement(AnnouncementId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Lesson(id) => write!(f, "lesson {id}"),
            Missing::Course(id) => write!(f, "course {id}"),
            Missing::User(id) => write!(f, "user {id}"),
            Missing::Enrollment { user, course } => {
                write!(f, "enrollment of user {user} in course {course}")
            }
            Missing::Certificate { user, course } => {
                write!(f, "certificate of user {user} for course {course}")
            }
            Missing::Document { user, course } => {
                write!(f, "certificate document of user {user} for course {course}")
            }
            Missing::CertificateNumber(number) => write!(f, "certificate number {number:?}"),
            Missing::Announcement(id) => write!(f, "announcement {id}"),
        }
    }
}

/// Errors emitted by the completion store, aggregator, issuer and facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("course progress is {percentage}%, certificate requires 100%")]
    Precondition { percentage: f64 },
    #[error("certificate number {0} is already taken")]
    DuplicateCertificateNumber(CertificateNumber),
    #[error("certificate rendering unavailable: {0}")]
    RenderingUnavailable(String),
    #[error("user is not enrolled in this course")]
    Unauthorized,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("a course with slug {0:?} already exists")]
    DuplicateSlug(String),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentServiceError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AnnouncementService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnnouncementServiceError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("only approved students may comment")]
    Unauthorized,
    #[error(transparent)]
    Announcement(#[from] AnnouncementError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
