use course_core::model::{Certificate, CertificateId, CertificateNumber, CourseId, NewCertificate, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_certificate_row, write_err};
use crate::repository::{CertificateRepository, StorageError};

const CERTIFICATE_COLUMNS: &str =
    "id, user_id, course_id, course_progress_id, certificate_number, issued_at, document";

#[async_trait::async_trait]
impl CertificateRepository for SqliteRepository {
    async fn insert_certificate(&self, cert: NewCertificate) -> Result<Certificate, StorageError> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO certificates (user_id, course_id, course_progress_id, certificate_number, issued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING {CERTIFICATE_COLUMNS}
            "
        ))
        .bind(id_i64("user_id", cert.user_id.value())?)
        .bind(id_i64("course_id", cert.course_id.value())?)
        .bind(id_i64("course_progress_id", cert.course_progress_id.value())?)
        .bind(cert.number.as_str())
        .bind(cert.issued_at)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;
        map_certificate_row(&row)
    }

    async fn get_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE user_id = ?1 AND course_id = ?2"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_certificate_row).transpose()
    }

    async fn get_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_number = ?1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_certificate_row).transpose()
    }

    async fn list_certificates(&self, user_id: UserId) -> Result<Vec<Certificate>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE user_id = ?1 ORDER BY issued_at ASC, id ASC"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_certificate_row).collect()
    }

    async fn attach_document(
        &self,
        id: CertificateId,
        document: &str,
    ) -> Result<Certificate, StorageError> {
        let raw_id = id_i64("certificate_id", id.value())?;
        let row = sqlx::query(&format!(
            r"
            UPDATE certificates SET document = ?2
            WHERE id = ?1 AND document IS NULL
            RETURNING {CERTIFICATE_COLUMNS}
            "
        ))
        .bind(raw_id)
        .bind(document)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_err)?;

        if let Some(row) = row {
            return map_certificate_row(&row);
        }
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM certificates WHERE id = ?1")
            .bind(raw_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Err(if exists.is_some() {
            StorageError::Conflict
        } else {
            StorageError::NotFound
        })
    }
}
