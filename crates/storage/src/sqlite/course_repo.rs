use course_core::model::{
    Course, CourseId, Lesson, LessonId, Material, ValidatedCourse, ValidatedLesson,
};

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, map_course_row, map_lesson_row, map_material_row, write_err,
};
use crate::repository::{CourseRepository, StorageError};

const COURSE_COLUMNS: &str = "id, name, slug, description, about, start_date, created_at";
const LESSON_COLUMNS: &str = "id, course_id, name, description, number, release_date, created_at";

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn insert_course(&self, course: ValidatedCourse) -> Result<Course, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO courses (name, slug, description, about, start_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(&course.name)
        .bind(&course.slug)
        .bind(&course.description)
        .bind(&course.about)
        .bind(course.start_date)
        .bind(course.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("course_id sign overflow".into()))?;
        Ok(course.assign_id(CourseId::new(id)))
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"))
            .bind(id_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_course_row).transpose()
    }

    async fn get_course_by_slug(&self, slug: &str) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE slug = ?1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_course_row).transpose()
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses ORDER BY name ASC, id ASC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_course_row).collect()
    }

    async fn insert_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO lessons (course_id, name, description, number, release_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id_i64("course_id", lesson.course_id.value())?)
        .bind(&lesson.name)
        .bind(&lesson.description)
        .bind(i64::from(lesson.number))
        .bind(lesson.release_date)
        .bind(lesson.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("lesson_id sign overflow".into()))?;
        Ok(lesson.assign_id(LessonId::new(id)))
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let row = sqlx::query(&format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1"))
            .bind(id_i64("lesson_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1 ORDER BY number ASC, id ASC"
        ))
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_lesson_row).collect()
    }

    async fn insert_material(&self, material: &Material) -> Result<Material, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO materials (lesson_id, name, embedded, file)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, lesson_id, name, embedded, file
            ",
        )
        .bind(id_i64("lesson_id", material.lesson_id.value())?)
        .bind(&material.name)
        .bind(&material.embedded)
        .bind(&material.file)
        .fetch_one(&self.pool)
        .await
        .map_err(write_err)?;
        map_material_row(&row)
    }

    async fn list_materials(&self, lesson_id: LessonId) -> Result<Vec<Material>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, lesson_id, name, embedded, file FROM materials WHERE lesson_id = ?1 ORDER BY id",
        )
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_material_row).collect()
    }
}
