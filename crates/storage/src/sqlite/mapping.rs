use chrono::{DateTime, NaiveDate, Utc};
use course_core::model::{
    Announcement, AnnouncementId, Certificate, CertificateId, CertificateNumber, Comment,
    CommentId, Course, CourseId, CourseProgress, CourseProgressId, Enrollment, EnrollmentId,
    EnrollmentStatus, Lesson, LessonCompletion, LessonId, Material, MaterialId, NewCertificate,
    UserId, UserProfile,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{StorageError, UniqueKey};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Classify write failures, surfacing unique-constraint hits by key.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = db.message();
            let key = if message.contains("certificates.certificate_number") {
                UniqueKey::CertificateNumber
            } else if message.contains("certificates.") {
                UniqueKey::CertificateOwner
            } else {
                UniqueKey::Other(message.to_owned())
            };
            return StorageError::UniqueViolation(key);
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    conn(e)
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn count_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_id(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    let raw: i64 = row.try_get(field).map_err(ser)?;
    i64_to_u64(field, raw)
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<UserProfile, StorageError> {
    UserProfile::new(
        UserId::new(get_id(row, "id")?),
        row.try_get::<String, _>("username").map_err(ser)?,
        row.try_get::<Option<String>, _>("full_name").map_err(ser)?,
        row.try_get::<Option<String>, _>("email").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    Ok(Course {
        id: CourseId::new(get_id(row, "id")?),
        name: row.try_get("name").map_err(ser)?,
        slug: row.try_get("slug").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        about: row.try_get("about").map_err(ser)?,
        start_date: row.try_get::<Option<NaiveDate>, _>("start_date").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let number: i64 = row.try_get("number").map_err(ser)?;
    Ok(Lesson {
        id: LessonId::new(get_id(row, "id")?),
        course_id: CourseId::new(get_id(row, "course_id")?),
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        number: i32::try_from(number)
            .map_err(|_| StorageError::Serialization(format!("invalid number: {number}")))?,
        release_date: row
            .try_get::<Option<NaiveDate>, _>("release_date")
            .map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_material_row(row: &SqliteRow) -> Result<Material, StorageError> {
    Material::new(
        MaterialId::new(get_id(row, "id")?),
        LessonId::new(get_id(row, "lesson_id")?),
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("embedded").map_err(ser)?,
        row.try_get::<Option<String>, _>("file").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    let status: i64 = row.try_get("status").map_err(ser)?;
    Ok(Enrollment {
        id: EnrollmentId::new(get_id(row, "id")?),
        user_id: UserId::new(get_id(row, "user_id")?),
        course_id: CourseId::new(get_id(row, "course_id")?),
        status: EnrollmentStatus::from_code(status).map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<LessonCompletion, StorageError> {
    LessonCompletion::from_persisted(
        UserId::new(get_id(row, "user_id")?),
        LessonId::new(get_id(row, "lesson_id")?),
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<CourseProgress, StorageError> {
    CourseProgress::from_persisted(
        CourseProgressId::new(get_id(row, "id")?),
        UserId::new(get_id(row, "user_id")?),
        CourseId::new(get_id(row, "course_id")?),
        EnrollmentId::new(get_id(row, "enrollment_id")?),
        count_u32(
            "completed_lessons",
            row.try_get("completed_lessons").map_err(ser)?,
        )?,
        count_u32("total_lessons", row.try_get("total_lessons").map_err(ser)?)?,
        row.try_get::<f64, _>("percentage").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_certificate_row(row: &SqliteRow) -> Result<Certificate, StorageError> {
    let record = NewCertificate {
        user_id: UserId::new(get_id(row, "user_id")?),
        course_id: CourseId::new(get_id(row, "course_id")?),
        course_progress_id: CourseProgressId::new(get_id(row, "course_progress_id")?),
        number: CertificateNumber::parse(
            row.try_get::<String, _>("certificate_number")
                .map_err(ser)?,
        )
        .map_err(ser)?,
        issued_at: row.try_get("issued_at").map_err(ser)?,
    };
    Ok(Certificate::from_persisted(
        CertificateId::new(get_id(row, "id")?),
        record,
        row.try_get::<Option<String>, _>("document").map_err(ser)?,
    ))
}

pub(crate) fn map_announcement_row(row: &SqliteRow) -> Result<Announcement, StorageError> {
    Ok(Announcement {
        id: AnnouncementId::new(get_id(row, "id")?),
        course_id: CourseId::new(get_id(row, "course_id")?),
        title: row.try_get("title").map_err(ser)?,
        content: row.try_get("content").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_comment_row(row: &SqliteRow) -> Result<Comment, StorageError> {
    Ok(Comment {
        id: CommentId::new(get_id(row, "id")?),
        announcement_id: AnnouncementId::new(get_id(row, "announcement_id")?),
        user_id: UserId::new(get_id(row, "user_id")?),
        text: row.try_get("text").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
