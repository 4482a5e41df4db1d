use std::sync::Arc;

use chrono::Duration;
use course_core::model::{
    Certificate, CertificateError, CertificateNumber, CourseId, CourseProgress, NewCertificate,
    UserId,
};
use storage::BlobStore;
use storage::repository::{
    CertificateRepository, CourseProgressRepository, CourseRepository, StorageError, UniqueKey,
    UserRepository,
};
use tracing::{info, warn};

use super::render::{CertificateFields, CertificateRenderer, RenderError};
use crate::Clock;
use crate::config::EngineConfig;
use crate::error::{Missing, ProgressError};

/// Issues at most one certificate per (user, course) and renders its document.
#[derive(Clone)]
pub struct CertificateIssuer {
    clock: Clock,
    config: EngineConfig,
    progress: Arc<dyn CourseProgressRepository>,
    certificates: Arc<dyn CertificateRepository>,
    courses: Arc<dyn CourseRepository>,
    users: Arc<dyn UserRepository>,
    renderer: Arc<dyn CertificateRenderer>,
    blobs: Arc<dyn BlobStore>,
}

impl CertificateIssuer {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        progress: Arc<dyn CourseProgressRepository>,
        certificates: Arc<dyn CertificateRepository>,
        courses: Arc<dyn CourseRepository>,
        users: Arc<dyn UserRepository>,
        renderer: Arc<dyn CertificateRenderer>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            clock,
            config,
            progress,
            certificates,
            courses,
            users,
            renderer,
            blobs,
        }
    }

    /// Issue the certificate for (user, course) once progress reaches 100%.
    ///
    /// Returns `Ok(None)` below 100% or without a progress row, and the
    /// existing certificate unchanged when one was already issued. A failed
    /// document render is logged and the certificate is returned without it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::DuplicateCertificateNumber` when every number
    /// attempt collided and `ProgressError::Storage` on repository failures.
    pub async fn issue_if_complete(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, ProgressError> {
        let Some(progress) = self.progress.get_progress(user_id, course_id).await? else {
            return Ok(None);
        };
        if !progress.is_complete() {
            return Ok(None);
        }
        if let Some(existing) = self.certificates.get_certificate(user_id, course_id).await? {
            return Ok(Some(existing));
        }

        let now = self.clock.now();
        let attempts = self.config.max_number_attempts.max(1);
        let mut attempt = 0;
        let cert = loop {
            let instant = now + Duration::nanoseconds(i64::from(attempt));
            let number = CertificateNumber::derive(user_id, course_id, instant);
            match self.create_with_number(&progress, number).await {
                Ok(cert) => break cert,
                Err(ProgressError::DuplicateCertificateNumber(number))
                    if attempt + 1 < attempts =>
                {
                    warn!(%number, attempt, "certificate number collision, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if cert.document().is_some() {
            return Ok(Some(cert));
        }
        match self.render_and_attach(cert.clone()).await {
            Ok(rendered) => Ok(Some(rendered)),
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    course_id = %course_id,
                    number = %cert.number(),
                    error = %err,
                    "certificate issued without document"
                );
                Ok(Some(cert))
            }
        }
    }

    /// Create the certificate row for a complete progress record.
    ///
    /// When another caller already issued the certificate for the same
    /// (user, course), that certificate is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Precondition` below 100%,
    /// `ProgressError::DuplicateCertificateNumber` if the derived number is
    /// taken by another certificate and `ProgressError::Storage` otherwise.
    pub async fn create_certificate(
        &self,
        progress: &CourseProgress,
    ) -> Result<Certificate, ProgressError> {
        let number =
            CertificateNumber::derive(progress.user_id(), progress.course_id(), self.clock.now());
        self.create_with_number(progress, number).await
    }

    async fn create_with_number(
        &self,
        progress: &CourseProgress,
        number: CertificateNumber,
    ) -> Result<Certificate, ProgressError> {
        let record = NewCertificate::for_progress(progress, number.clone(), self.clock.now())
            .map_err(|e| match e {
                CertificateError::Incomplete { percentage } => {
                    ProgressError::Precondition { percentage }
                }
                other => ProgressError::Storage(StorageError::Serialization(other.to_string())),
            })?;

        match self.certificates.insert_certificate(record).await {
            Ok(cert) => {
                info!(
                    user_id = %cert.user_id(),
                    course_id = %cert.course_id(),
                    number = %cert.number(),
                    "certificate issued"
                );
                Ok(cert)
            }
            Err(StorageError::UniqueViolation(UniqueKey::CertificateOwner)) => self
                .certificates
                .get_certificate(progress.user_id(), progress.course_id())
                .await?
                .ok_or(ProgressError::Storage(StorageError::Conflict)),
            Err(StorageError::UniqueViolation(UniqueKey::CertificateNumber)) => {
                Err(ProgressError::DuplicateCertificateNumber(number))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Render the document again and attach it if none was recorded.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` when no certificate exists,
    /// `ProgressError::RenderingUnavailable` / `ProgressError::Render` when
    /// rendering fails and `ProgressError::Storage` on persistence failures.
    pub async fn rerender(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Certificate, ProgressError> {
        let cert = self
            .certificates
            .get_certificate(user_id, course_id)
            .await?
            .ok_or(ProgressError::NotFound(Missing::Certificate {
                user: user_id,
                course: course_id,
            }))?;
        self.render_and_attach(cert).await
    }

    async fn render_and_attach(&self, cert: Certificate) -> Result<Certificate, ProgressError> {
        if !self.config.render_documents {
            return Err(ProgressError::RenderingUnavailable(
                "document rendering is disabled".into(),
            ));
        }

        let fields = self.fields_for(&cert).await?;
        let bytes = self.renderer.render(&fields).map_err(|e| match e {
            RenderError::Unavailable(reason) => ProgressError::RenderingUnavailable(reason),
            other => ProgressError::Render(other),
        })?;

        let name = cert.document_name();
        self.blobs.put(&name, bytes).await?;

        if cert.document().is_some() {
            return Ok(cert);
        }
        match self.certificates.attach_document(cert.id(), &name).await {
            Ok(updated) => Ok(updated),
            // A concurrent render attached first; the stored name is the same.
            Err(StorageError::Conflict) => self
                .certificates
                .get_certificate(cert.user_id(), cert.course_id())
                .await?
                .ok_or(ProgressError::Storage(StorageError::NotFound)),
            Err(other) => Err(other.into()),
        }
    }

    async fn fields_for(&self, cert: &Certificate) -> Result<CertificateFields, ProgressError> {
        let course = self
            .courses
            .get_course(cert.course_id())
            .await?
            .ok_or(ProgressError::NotFound(Missing::Course(cert.course_id())))?;
        let user = self
            .users
            .get_user(cert.user_id())
            .await?
            .ok_or(ProgressError::NotFound(Missing::User(cert.user_id())))?;

        Ok(CertificateFields {
            recipient: user.display_name().to_owned(),
            course_name: course.name,
            issued_on: cert.issued_at().date_naive(),
            number: cert.number().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::{DisabledRenderer, PdfCertificateRenderer};
    use async_trait::async_trait;
    use course_core::model::{CourseDraft, EnrollmentStatus, LessonDraft, UserProfile};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::{
        EnrollmentRepository, InMemoryRepository, LessonCompletionRepository,
    };
    use storage::{BlobReader, InMemoryBlobStore};

    struct Fixture {
        repo: InMemoryRepository,
        user: UserId,
        course: CourseId,
    }

    async fn fixture(complete: bool) -> Fixture {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let user = UserId::new(1);
        repo.upsert_user(&UserProfile::new(user, "ana", Some("Ana Souza".into()), None).unwrap())
            .await
            .unwrap();
        let course = repo
            .insert_course(CourseDraft::named("Rust Basics").validate(now).unwrap())
            .await
            .unwrap();
        let lesson = repo
            .insert_lesson(LessonDraft::new(course.id, "Intro", 1).validate(now).unwrap())
            .await
            .unwrap();
        let enrollment = repo
            .upsert_enrollment(user, course.id, EnrollmentStatus::Approved, now)
            .await
            .unwrap();
        repo.create_progress_if_absent(&enrollment).await.unwrap();
        repo.set_completed(user, lesson.id, complete, now).await.unwrap();
        repo.recompute_progress(user, course.id, now).await.unwrap();
        Fixture {
            repo,
            user,
            course: course.id,
        }
    }

    fn issuer(
        repo: &InMemoryRepository,
        renderer: Arc<dyn CertificateRenderer>,
        blobs: Arc<dyn BlobStore>,
    ) -> CertificateIssuer {
        CertificateIssuer::new(
            fixed_clock(),
            EngineConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            renderer,
            blobs,
        )
    }

    #[tokio::test]
    async fn below_threshold_issues_nothing() {
        let f = fixture(false).await;
        let issuer = issuer(
            &f.repo,
            Arc::new(PdfCertificateRenderer::default()),
            Arc::new(InMemoryBlobStore::new()),
        );
        assert!(issuer.issue_if_complete(f.user, f.course).await.unwrap().is_none());
        assert!(f.repo.get_certificate(f.user, f.course).await.unwrap().is_none());

        let progress = f.repo.get_progress(f.user, f.course).await.unwrap().unwrap();
        let err = issuer.create_certificate(&progress).await.unwrap_err();
        assert!(matches!(err, ProgressError::Precondition { percentage } if percentage == 0.0));
        assert!(f.repo.get_certificate(f.user, f.course).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn issuance_is_idempotent_and_renders_once() {
        let f = fixture(true).await;
        let blobs = Arc::new(InMemoryBlobStore::new());
        let issuer = issuer(
            &f.repo,
            Arc::new(PdfCertificateRenderer::default()),
            blobs.clone(),
        );

        let first = issuer.issue_if_complete(f.user, f.course).await.unwrap().unwrap();
        let second = issuer.issue_if_complete(f.user, f.course).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.document(), Some(first.document_name().as_str()));
        assert!(blobs.exists(&first.document_name()).await.unwrap());
    }

    #[tokio::test]
    async fn render_failure_keeps_certificate_and_rerender_reports_it() {
        let f = fixture(true).await;
        let issuer = issuer(
            &f.repo,
            Arc::new(DisabledRenderer),
            Arc::new(InMemoryBlobStore::new()),
        );

        let cert = issuer.issue_if_complete(f.user, f.course).await.unwrap().unwrap();
        assert!(cert.document().is_none());

        let err = issuer.rerender(f.user, f.course).await.unwrap_err();
        assert!(matches!(err, ProgressError::RenderingUnavailable(_)));
        assert!(f.repo.get_certificate(f.user, f.course).await.unwrap().is_some());
    }

    struct FlakyBlobs {
        inner: InMemoryBlobStore,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl BlobStore for FlakyBlobs {
        async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
            if self.fail.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(StorageError::Io("disk full".into()));
            }
            self.inner.put(name, bytes).await
        }

        async fn open(&self, name: &str) -> Result<BlobReader, StorageError> {
            self.inner.open(name).await
        }

        async fn exists(&self, name: &str) -> Result<bool, StorageError> {
            self.inner.exists(name).await
        }
    }

    #[tokio::test]
    async fn rerender_attaches_document_after_blob_failure() {
        let f = fixture(true).await;
        let blobs = Arc::new(FlakyBlobs {
            inner: InMemoryBlobStore::new(),
            fail: std::sync::atomic::AtomicBool::new(true),
        });
        let issuer = issuer(
            &f.repo,
            Arc::new(PdfCertificateRenderer::default()),
            blobs.clone(),
        );

        let cert = issuer.issue_if_complete(f.user, f.course).await.unwrap().unwrap();
        assert!(cert.document().is_none());

        let rerendered = issuer.rerender(f.user, f.course).await.unwrap();
        assert_eq!(rerendered.number(), cert.number());
        assert!(rerendered.document().is_some());
        assert!(blobs.exists(&cert.document_name()).await.unwrap());
    }

    /// Give another user a complete progress row and a certificate numbered
    /// `taken`.
    async fn occupy_number(f: &Fixture, taken: CertificateNumber) {
        let now = fixed_now();
        let other_user = UserId::new(2);
        let enrollment = f
            .repo
            .upsert_enrollment(other_user, f.course, EnrollmentStatus::Approved, now)
            .await
            .unwrap();
        f.repo.create_progress_if_absent(&enrollment).await.unwrap();
        for lesson in f.repo.list_lessons(f.course).await.unwrap() {
            f.repo.set_completed(other_user, lesson.id, true, now).await.unwrap();
        }
        let other = f
            .repo
            .recompute_progress(other_user, f.course, now)
            .await
            .unwrap()
            .unwrap();
        f.repo
            .insert_certificate(NewCertificate::for_progress(&other, taken, now).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn colliding_number_is_retried_with_a_new_instant() {
        let f = fixture(true).await;
        let now = fixed_now();
        let taken = CertificateNumber::derive(f.user, f.course, now);
        occupy_number(&f, taken.clone()).await;

        let issuer = issuer(
            &f.repo,
            Arc::new(DisabledRenderer),
            Arc::new(InMemoryBlobStore::new()),
        );
        let cert = issuer.issue_if_complete(f.user, f.course).await.unwrap().unwrap();
        assert_ne!(cert.number(), &taken);
        assert_eq!(
            cert.number(),
            &CertificateNumber::derive(f.user, f.course, now + Duration::nanoseconds(1))
        );
    }

    #[tokio::test]
    async fn exhausted_number_attempts_report_the_collision() {
        let f = fixture(true).await;
        let taken = CertificateNumber::derive(f.user, f.course, fixed_now());
        occupy_number(&f, taken.clone()).await;

        let issuer = CertificateIssuer::new(
            fixed_clock(),
            EngineConfig {
                max_number_attempts: 1,
                ..EngineConfig::default()
            },
            Arc::new(f.repo.clone()),
            Arc::new(f.repo.clone()),
            Arc::new(f.repo.clone()),
            Arc::new(f.repo.clone()),
            Arc::new(DisabledRenderer),
            Arc::new(InMemoryBlobStore::new()),
        );
        let err = issuer.issue_if_complete(f.user, f.course).await.unwrap_err();
        assert!(matches!(err, ProgressError::DuplicateCertificateNumber(n) if n == taken));
        assert!(f.repo.get_certificate(f.user, f.course).await.unwrap().is_none());
    }
}
