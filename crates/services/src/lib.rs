#![forbid(unsafe_code)]

pub mod aggregator;
pub mod announcement_service;
pub mod app_services;
pub mod catalog_service;
pub mod certificates;
pub mod config;
pub mod enrollment_service;
pub mod error;
pub mod facade;
pub mod lesson_store;

pub use course_core::Clock;

pub use aggregator::ProgressAggregator;
pub use announcement_service::AnnouncementService;
pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use certificates::{
    CertificateFields, CertificateIssuer, CertificateRenderer, DisabledRenderer,
    PdfCertificateRenderer, RenderError,
};
pub use config::EngineConfig;
pub use enrollment_service::EnrollmentService;
pub use error::{
    AnnouncementServiceError, AppServicesError, CatalogError, EnrollmentServiceError, Missing,
    ProgressError,
};
pub use facade::{
    CertificateDownload, CertificateState, CourseStanding, CourseState, LessonState,
    PDF_CONTENT_TYPE, ProgressFacade, ToggleOutcome,
};
pub use lesson_store::LessonCompletionStore;
