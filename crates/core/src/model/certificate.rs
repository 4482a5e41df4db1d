use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{CertificateId, CourseId, CourseProgressId, UserId};
use crate::model::progress::CourseProgress;

/// Length of every certificate number.
pub const CERTIFICATE_NUMBER_LEN: usize = 16;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    #[error("course is only {percentage}% complete")]
    Incomplete { percentage: f64 },

    #[error("invalid certificate number: {0:?}")]
    InvalidNumber(String),

    #[error("certificate already has a document attached")]
    DocumentAlreadyAttached,
}

//
// ─── CERTIFICATE NUMBER ────────────────────────────────────────────────────────
//

/// Opaque, fixed-length token identifying an issued certificate.
///
/// Always `CERTIFICATE_NUMBER_LEN` upper-case hexadecimal characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CertificateNumber(String);

impl CertificateNumber {
    /// Derive a number from who completed what, and when.
    ///
    /// The instant is hashed with nanosecond precision, so a retry after a
    /// collision only needs a different instant.
    #[must_use]
    pub fn derive(user_id: UserId, course_id: CourseId, instant: DateTime<Utc>) -> Self {
        let input = format!(
            "{user_id}{course_id}{}",
            instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let digest = Sha256::digest(input.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(CERTIFICATE_NUMBER_LEN);
        encoded.make_ascii_uppercase();
        Self(encoded)
    }

    /// Parse a stored or user-supplied number.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::InvalidNumber` if the value is not 16
    /// upper-case alphanumeric characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CertificateError> {
        let raw = raw.into();
        let valid = raw.len() == CERTIFICATE_NUMBER_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
        if valid {
            Ok(Self(raw))
        } else {
            Err(CertificateError::InvalidNumber(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── CERTIFICATE ───────────────────────────────────────────────────────────────
//

/// A certificate ready to be inserted; only buildable from a complete course.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificate {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub course_progress_id: CourseProgressId,
    pub number: CertificateNumber,
    pub issued_at: DateTime<Utc>,
}

impl NewCertificate {
    /// # Errors
    ///
    /// Returns `CertificateError::Incomplete` when the progress is below 100%.
    pub fn for_progress(
        progress: &CourseProgress,
        number: CertificateNumber,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, CertificateError> {
        if !progress.is_complete() {
            return Err(CertificateError::Incomplete {
                percentage: progress.percentage(),
            });
        }
        Ok(Self {
            user_id: progress.user_id(),
            course_id: progress.course_id(),
            course_progress_id: progress.id(),
            number,
            issued_at,
        })
    }

    #[must_use]
    pub fn assign_id(self, id: CertificateId) -> Certificate {
        Certificate {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            course_progress_id: self.course_progress_id,
            number: self.number,
            issued_at: self.issued_at,
            document: None,
        }
    }
}

/// Proof that a user completed a course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Certificate {
    id: CertificateId,
    user_id: UserId,
    course_id: CourseId,
    course_progress_id: CourseProgressId,
    number: CertificateNumber,
    issued_at: DateTime<Utc>,
    document: Option<String>,
}

impl Certificate {
    #[must_use]
    pub fn from_persisted(
        id: CertificateId,
        record: NewCertificate,
        document: Option<String>,
    ) -> Self {
        let mut cert = record.assign_id(id);
        cert.document = document;
        cert
    }

    /// Record the blob name of the rendered document. Written at most once.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::DocumentAlreadyAttached` if a document exists.
    pub fn attach_document(&mut self, name: impl Into<String>) -> Result<(), CertificateError> {
        if self.document.is_some() {
            return Err(CertificateError::DocumentAlreadyAttached);
        }
        self.document = Some(name.into());
        Ok(())
    }

    /// Blob name under which the rendered document is stored.
    #[must_use]
    pub fn document_name(&self) -> String {
        format!(
            "certificado_{}_{}_{}.pdf",
            self.user_id, self.course_id, self.number
        )
    }

    /// Filename suggested to browsers downloading the document.
    #[must_use]
    pub fn download_filename(&self) -> String {
        format!("certificado_{}.pdf", self.number)
    }

    #[must_use]
    pub fn id(&self) -> CertificateId {
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
    pub fn course_progress_id(&self) -> CourseProgressId {
        self.course_progress_id
    }

    #[must_use]
    pub fn number(&self) -> &CertificateNumber {
        &self.number
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    #[must_use]
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }
}

//
// ─── LAYOUT HELPERS ────────────────────────────────────────────────────────────
//

/// Greedy word wrap: every line is at most `width` characters unless a
/// single word is longer.
#[must_use]
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed <= width || current.is_empty() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
