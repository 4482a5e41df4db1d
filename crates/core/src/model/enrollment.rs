use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, EnrollmentId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("invalid enrollment status value: {0}")]
    InvalidStatus(i64),
}

/// Approval state of an enrollment. Only `Approved` grants access to lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Cancelled,
}

impl EnrollmentStatus {
    /// Storage encoding: Pending=0, Approved=1, Cancelled=2.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            EnrollmentStatus::Pending => 0,
            EnrollmentStatus::Approved => 1,
            EnrollmentStatus::Cancelled => 2,
        }
    }

    /// # Errors
    ///
    /// Returns `EnrollmentError::InvalidStatus` for unknown codes.
    pub fn from_code(code: i64) -> Result<Self, EnrollmentError> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Approved),
            2 => Ok(Self::Cancelled),
            other => Err(EnrollmentError::InvalidStatus(other)),
        }
    }
}

/// Links a user to a course; unique per (user, course).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == EnrollmentStatus::Approved
    }

    pub fn set_status(&mut self, status: EnrollmentStatus, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn status_codes_match_storage_encoding() {
        assert_eq!(EnrollmentStatus::from_code(1).unwrap(), EnrollmentStatus::Approved);
        assert_eq!(EnrollmentStatus::Cancelled.code(), 2);
        assert!(matches!(
            EnrollmentStatus::from_code(9),
            Err(EnrollmentError::InvalidStatus(9))
        ));
    }

    #[test]
    fn set_status_touches_updated_at_only_on_change() {
        let now = fixed_now();
        let mut e = Enrollment {
            id: EnrollmentId::new(1),
            user_id: UserId::new(1),
            course_id: CourseId::new(1),
            status: EnrollmentStatus::Approved,
            created_at: now,
            updated_at: now,
        };
        let later = now + chrono::Duration::hours(1);
        e.set_status(EnrollmentStatus::Approved, later);
        assert_eq!(e.updated_at, now);
        e.set_status(EnrollmentStatus::Cancelled, later);
        assert_eq!(e.updated_at, later);
        assert!(!e.is_approved());
    }
}
