use std::sync::Arc;

use storage::repository::Storage;
use storage::{BlobStore, FsBlobStore};
use tracing::info;

use crate::Clock;
use crate::announcement_service::AnnouncementService;
use crate::catalog_service::CatalogService;
use crate::certificates::{CertificateRenderer, DisabledRenderer, PdfCertificateRenderer};
use crate::config::EngineConfig;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::facade::ProgressFacade;

/// Assembles the app-facing services over one storage bundle.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    facade: Arc<ProgressFacade>,
    catalog: Arc<CatalogService>,
    enrollment: Arc<EnrollmentService>,
    announcements: Arc<AnnouncementService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, storing certificate
    /// documents under `config.certificate_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.certificate_dir.clone()));
        info!(
            certificate_dir = %config.certificate_dir.display(),
            render_documents = config.render_documents,
            "services ready"
        );
        Ok(Self::from_storage(storage, blobs, clock, config))
    }

    /// Wire every service over an existing storage bundle.
    #[must_use]
    pub fn from_storage(
        storage: Storage,
        blobs: Arc<dyn BlobStore>,
        clock: Clock,
        config: EngineConfig,
    ) -> Self {
        let renderer: Arc<dyn CertificateRenderer> = if config.render_documents {
            Arc::new(PdfCertificateRenderer::new(config.title_wrap_width))
        } else {
            Arc::new(DisabledRenderer)
        };
        let facade = ProgressFacade::from_storage(clock, config, &storage, renderer, blobs);
        let catalog = CatalogService::new(clock, Arc::clone(&storage.courses));
        let enrollment = EnrollmentService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            facade.aggregator().clone(),
        );
        let announcements = AnnouncementService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.announcements),
        );

        Self {
            storage,
            facade: Arc::new(facade),
            catalog: Arc::new(catalog),
            enrollment: Arc::new(enrollment),
            announcements: Arc::new(announcements),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressFacade> {
        Arc::clone(&self.facade)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn enrollment(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollment)
    }

    #[must_use]
    pub fn announcements(&self) -> Arc<AnnouncementService> {
        Arc::clone(&self.announcements)
    }
}
