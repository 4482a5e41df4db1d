use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use course_core::model::{
    Certificate, CertificateNumber, CourseId, CourseProgress, Enrollment, Lesson,
    LessonCompletion, LessonId, UserId,
};
use serde::Serialize;
use storage::repository::{CertificateRepository, CourseRepository, EnrollmentRepository, Storage};
use storage::{BlobReader, BlobStore, StorageError};
use tracing::debug;

use crate::Clock;
use crate::aggregator::ProgressAggregator;
use crate::certificates::{CertificateIssuer, CertificateRenderer};
use crate::config::EngineConfig;
use crate::error::{Missing, ProgressError};
use crate::lesson_store::LessonCompletionStore;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

//
// ─── RESPONSE SHAPES ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonState {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseState {
    pub completed_lessons: u32,
    pub total_lessons: u32,
    pub progress_percentage: f64,
    /// True once the course has ever been finished.
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&CourseProgress> for CourseState {
    fn from(p: &CourseProgress) -> Self {
        Self {
            completed_lessons: p.completed_lessons(),
            total_lessons: p.total_lessons(),
            progress_percentage: p.percentage(),
            completed: p.completed_at().is_some(),
            completed_at: p.completed_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateState {
    pub generated: bool,
    pub certificate_number: Option<String>,
}

/// Summary handed back after toggling a lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleOutcome {
    pub lesson_progress: LessonState,
    pub course_progress: CourseState,
    /// Present when the course is at 100%.
    pub certificate: Option<CertificateState>,
}

/// A recomputed progress row paired with its certificate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseStanding {
    pub progress: CourseProgress,
    pub certificate: Option<Certificate>,
}

/// Streaming certificate document with its response metadata.
pub struct CertificateDownload {
    pub filename: String,
    pub content_type: &'static str,
    pub reader: BlobReader,
}

impl fmt::Debug for CertificateDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateDownload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

struct Applied {
    completion: LessonCompletion,
    progress: CourseProgress,
    certificate: Option<Certificate>,
}

//
// ─── FACADE ────────────────────────────────────────────────────────────────────
//

/// Entry point for lesson toggles, progress queries and certificates.
#[derive(Clone)]
pub struct ProgressFacade {
    store: LessonCompletionStore,
    aggregator: ProgressAggregator,
    issuer: CertificateIssuer,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    certificates: Arc<dyn CertificateRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl ProgressFacade {
    #[must_use]
    pub fn new(
        store: LessonCompletionStore,
        aggregator: ProgressAggregator,
        issuer: CertificateIssuer,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        certificates: Arc<dyn CertificateRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            aggregator,
            issuer,
            courses,
            enrollments,
            certificates,
            blobs,
        }
    }

    /// Wire the facade and its components over one storage bundle.
    #[must_use]
    pub fn from_storage(
        clock: Clock,
        config: EngineConfig,
        storage: &Storage,
        renderer: Arc<dyn CertificateRenderer>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let store = LessonCompletionStore::new(clock, Arc::clone(&storage.completions));
        let aggregator = ProgressAggregator::new(clock, Arc::clone(&storage.progress));
        let issuer = CertificateIssuer::new(
            clock,
            config,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.certificates),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.users),
            renderer,
            Arc::clone(&blobs),
        );
        Self::new(
            store,
            aggregator,
            issuer,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.certificates),
            blobs,
        )
    }

    #[must_use]
    pub fn issuer(&self) -> &CertificateIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn aggregator(&self) -> &ProgressAggregator {
        &self.aggregator
    }

    async fn authorize(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<(Lesson, Enrollment), ProgressError> {
        let lesson = self
            .courses
            .get_lesson(lesson_id)
            .await?
            .ok_or(ProgressError::NotFound(Missing::Lesson(lesson_id)))?;
        match self
            .enrollments
            .get_enrollment(user_id, lesson.course_id)
            .await?
        {
            Some(enrollment) if enrollment.is_approved() => Ok((lesson, enrollment)),
            _ => Err(ProgressError::Unauthorized),
        }
    }

    async fn apply(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
    ) -> Result<Applied, ProgressError> {
        let (lesson, enrollment) = self.authorize(user_id, lesson_id).await?;
        let completion = self.store.set_completed(user_id, lesson_id, completed).await?;

        let progress = match self.aggregator.recompute(user_id, lesson.course_id).await? {
            Some(progress) => progress,
            None => self.aggregator.initialize(&enrollment).await?,
        };
        debug!(
            user_id = %user_id,
            lesson_id = %lesson_id,
            completed,
            percentage = progress.percentage(),
            "lesson toggled"
        );

        let certificate = if completed && progress.is_complete() {
            self.issuer
                .issue_if_complete(user_id, lesson.course_id)
                .await?
        } else {
            None
        };
        Ok(Applied {
            completion,
            progress,
            certificate,
        })
    }

    /// Mark a lesson completed, recompute the course and issue the
    /// certificate when the course reaches 100%.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for an unknown lesson,
    /// `ProgressError::Unauthorized` without an approved enrollment and
    /// `ProgressError::Storage` on repository failures.
    pub async fn mark_complete(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<LessonCompletion, ProgressError> {
        Ok(self.apply(user_id, lesson_id, true).await?.completion)
    }

    /// Clear a lesson's completion and recompute. Issued certificates stay.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressFacade::mark_complete`].
    pub async fn mark_incomplete(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<LessonCompletion, ProgressError> {
        Ok(self.apply(user_id, lesson_id, false).await?.completion)
    }

    /// Toggle a lesson and summarize the resulting course state.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressFacade::mark_complete`].
    pub async fn toggle_lesson(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
    ) -> Result<ToggleOutcome, ProgressError> {
        let applied = self.apply(user_id, lesson_id, completed).await?;
        let certificate = (completed && applied.progress.is_complete()).then(|| {
            CertificateState {
                generated: applied.certificate.is_some(),
                certificate_number: applied
                    .certificate
                    .as_ref()
                    .map(|c| c.number().to_string()),
            }
        });
        Ok(ToggleOutcome {
            lesson_progress: LessonState {
                completed: applied.completion.completed(),
                completed_at: applied.completion.completed_at(),
            },
            course_progress: CourseState::from(&applied.progress),
            certificate,
        })
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn lesson_completion(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonCompletion>, ProgressError> {
        self.store.get(user_id, lesson_id).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn completed_lessons(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<LessonCompletion>, ProgressError> {
        self.store.list_completed(user_id, course_id).await
    }

    /// Recompute and return progress; `Ok(None)` when the user has none.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if recomputing fails.
    pub async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, ProgressError> {
        self.aggregator.recompute(user_id, course_id).await
    }

    /// Recompute and return every progress row of the user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if recomputing fails.
    pub async fn get_user_courses_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgress>, ProgressError> {
        self.aggregator.recompute_all(user_id).await
    }

    /// Every course of the user with fresh progress and its certificate.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on repository failures.
    pub async fn dashboard(&self, user_id: UserId) -> Result<Vec<CourseStanding>, ProgressError> {
        let rows = self.aggregator.recompute_all(user_id).await?;
        let mut out = Vec::with_capacity(rows.len());
        for progress in rows {
            let certificate = self
                .certificates
                .get_certificate(user_id, progress.course_id())
                .await?;
            out.push(CourseStanding {
                progress,
                certificate,
            });
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` when no certificate was issued.
    pub async fn certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Certificate, ProgressError> {
        self.certificates
            .get_certificate(user_id, course_id)
            .await?
            .ok_or(ProgressError::NotFound(Missing::Certificate {
                user: user_id,
                course: course_id,
            }))
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if repository access fails.
    pub async fn my_certificates(&self, user_id: UserId) -> Result<Vec<Certificate>, ProgressError> {
        Ok(self.certificates.list_certificates(user_id).await?)
    }

    /// Look up a certificate by the number printed on it. Case and
    /// surrounding whitespace are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for a malformed or unknown number.
    pub async fn verify_certificate(&self, number: &str) -> Result<Certificate, ProgressError> {
        let missing = || ProgressError::NotFound(Missing::CertificateNumber(number.to_owned()));
        let Ok(parsed) = CertificateNumber::parse(number.trim().to_ascii_uppercase()) else {
            return Err(missing());
        };
        self.certificates
            .get_certificate_by_number(&parsed)
            .await?
            .ok_or_else(missing)
    }

    /// Open the rendered certificate for streaming.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` when there is no certificate or it
    /// has no stored document.
    pub async fn download_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CertificateDownload, ProgressError> {
        let cert = self.certificate(user_id, course_id).await?;
        let missing = || {
            ProgressError::NotFound(Missing::Document {
                user: user_id,
                course: course_id,
            })
        };
        let document = cert.document().ok_or_else(missing)?;
        let reader = match self.blobs.open(document).await {
            Ok(reader) => reader,
            Err(StorageError::NotFound) => return Err(missing()),
            Err(other) => return Err(other.into()),
        };
        Ok(CertificateDownload {
            filename: cert.download_filename(),
            content_type: PDF_CONTENT_TYPE,
            reader,
        })
    }

    /// Render the certificate document again.
    ///
    /// # Errors
    ///
    /// See [`CertificateIssuer::rerender`].
    pub async fn rerender_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Certificate, ProgressError> {
        self.issuer.rerender(user_id, course_id).await
    }
}
