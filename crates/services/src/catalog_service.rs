use std::sync::Arc;

use course_core::model::{
    Course, CourseDraft, CourseId, Lesson, LessonDraft, LessonId, Material, MaterialId,
};
use storage::repository::{CourseRepository, StorageError, UniqueKey};
use tracing::info;

use crate::Clock;
use crate::error::{CatalogError, Missing};

/// Courses, lesson rosters and materials.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(clock: Clock, courses: Arc<dyn CourseRepository>) -> Self {
        Self { clock, courses }
    }

    /// Validate and persist a new course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Course` for validation failures,
    /// `CatalogError::DuplicateSlug` when the slug is taken and
    /// `CatalogError::Storage` if persistence fails.
    pub async fn create_course(&self, draft: CourseDraft) -> Result<Course, CatalogError> {
        let validated = draft.validate(self.clock.now())?;
        let slug = validated.slug.clone();
        match self.courses.insert_course(validated).await {
            Ok(course) => {
                info!(course_id = %course.id, slug = %course.slug, "course created");
                Ok(course)
            }
            Err(StorageError::UniqueViolation(UniqueKey::Other(_))) => {
                Err(CatalogError::DuplicateSlug(slug))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown course,
    /// `CatalogError::Course` for validation failures and
    /// `CatalogError::Storage` if persistence fails.
    pub async fn add_lesson(&self, draft: LessonDraft) -> Result<Lesson, CatalogError> {
        let course_id = draft.course_id;
        let validated = draft.validate(self.clock.now())?;
        self.courses
            .insert_lesson(validated)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => CatalogError::NotFound(Missing::Course(course_id)),
                other => other.into(),
            })
    }

    /// Attach a video embed or an uploaded file to a lesson.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Course` when neither source is given,
    /// `CatalogError::NotFound` for an unknown lesson and
    /// `CatalogError::Storage` if persistence fails.
    pub async fn add_material(
        &self,
        lesson_id: LessonId,
        name: String,
        embedded: Option<String>,
        file: Option<String>,
    ) -> Result<Material, CatalogError> {
        let material = Material::new(MaterialId::new(1), lesson_id, name, embedded, file)?;
        self.courses
            .insert_material(&material)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => CatalogError::NotFound(Missing::Lesson(lesson_id)),
                other => other.into(),
            })
    }

    /// Courses ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, CatalogError> {
        Ok(self.courses.list_courses(limit).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn course(&self, id: CourseId) -> Result<Option<Course>, CatalogError> {
        Ok(self.courses.get_course(id).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Course>, CatalogError> {
        Ok(self.courses.get_course_by_slug(slug).await?)
    }

    /// Case-insensitive match on name or description.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<Course>, CatalogError> {
        let courses = self.courses.list_courses(u32::MAX).await?;
        Ok(courses
            .into_iter()
            .filter(|c| c.matches(query))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    /// Lessons in (number, id) order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn roster(&self, course_id: CourseId) -> Result<Vec<Lesson>, CatalogError> {
        Ok(self.courses.list_lessons(course_id).await?)
    }

    /// Roster filtered to lessons released as of today.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn released_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, CatalogError> {
        let today = self.clock.today();
        let mut lessons = self.courses.list_lessons(course_id).await?;
        lessons.retain(|l| l.is_released(today));
        Ok(lessons)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn materials(&self, lesson_id: LessonId) -> Result<Vec<Material>, CatalogError> {
        Ok(self.courses.list_materials(lesson_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn service() -> CatalogService {
        CatalogService::new(fixed_clock(), Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn duplicate_slug_is_reported() {
        let catalog = service();
        catalog.create_course(CourseDraft::named("Rust Basics")).await.unwrap();
        let err = catalog
            .create_course(CourseDraft::named("Rust  Basics"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSlug(slug) if slug == "rust-basics"));
    }

    #[tokio::test]
    async fn search_matches_name_or_description() {
        let catalog = service();
        catalog
            .create_course(CourseDraft::named("Cooking").with_description("Learn Rust-free recipes"))
            .await
            .unwrap();
        catalog.create_course(CourseDraft::named("Rust Basics")).await.unwrap();
        catalog.create_course(CourseDraft::named("Gardening")).await.unwrap();

        let hits = catalog.search("rust", 10).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Cooking", "Rust Basics"]);
    }

    #[tokio::test]
    async fn released_lessons_hide_future_release_dates() {
        let catalog = service();
        let course = catalog.create_course(CourseDraft::named("Timed")).await.unwrap();
        let today = fixed_now().date_naive();
        catalog
            .add_lesson(LessonDraft::new(course.id, "Open", 1))
            .await
            .unwrap();
        catalog
            .add_lesson(LessonDraft::new(course.id, "Today", 2).released_on(today))
            .await
            .unwrap();
        catalog
            .add_lesson(
                LessonDraft::new(course.id, "Later", 3).released_on(today + Duration::days(1)),
            )
            .await
            .unwrap();

        let released = catalog.released_lessons(course.id).await.unwrap();
        let names: Vec<&str> = released.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Open", "Today"]);
        assert_eq!(catalog.roster(course.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn material_requires_a_source_and_a_lesson() {
        let catalog = service();
        let err = catalog
            .add_material(LessonId::new(1), "Slides".into(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Course(_)));

        let err = catalog
            .add_material(LessonId::new(99), "Slides".into(), None, Some("a.pdf".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(Missing::Lesson(_))));
    }
}
