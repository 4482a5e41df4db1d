#![forbid(unsafe_code)]

pub mod blob;
pub mod repository;
pub mod sqlite;

pub use blob::{BlobReader, BlobStore, FsBlobStore, InMemoryBlobStore};
pub use repository::{
    AnnouncementRepository, CertificateRepository, CourseProgressRepository, CourseRepository,
    EnrollmentRepository, InMemoryRepository, LessonCompletionRepository, Storage, StorageError,
    UniqueKey, UserRepository,
};
