use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, MaterialId};

pub const MAX_NAME_LEN: usize = 100;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("name is longer than {MAX_NAME_LEN} characters")]
    NameTooLong,

    #[error("invalid slug: {0:?}")]
    InvalidSlug(String),

    #[error("material needs an embedded video or an uploaded file")]
    EmptyMaterial,
}

fn validated_name(raw: String) -> Result<String, CourseError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CourseError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CourseError::NameTooLong);
    }
    Ok(name.to_owned())
}

fn validated_slug(raw: String) -> Result<String, CourseError> {
    let ok = !raw.is_empty()
        && !raw.starts_with('-')
        && !raw.ends_with('-')
        && raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok { Ok(raw) } else { Err(CourseError::InvalidSlug(raw)) }
}

/// Builds a URL slug from a course name ("Python Básico 2" -> "python-b-sico-2").
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDraft {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub about: String,
    pub start_date: Option<NaiveDate>,
}

impl CourseDraft {
    /// Draft with the slug derived from the name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let slug = slugify(&name);
        Self {
            name,
            slug,
            description: String::new(),
            about: String::new(),
            start_date: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// # Errors
    ///
    /// Returns `CourseError` if the name or slug is invalid.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedCourse, CourseError> {
        Ok(ValidatedCourse {
            name: validated_name(self.name)?,
            slug: validated_slug(self.slug)?,
            description: self.description,
            about: self.about,
            start_date: self.start_date,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCourse {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub about: String,
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl ValidatedCourse {
    #[must_use]
    pub fn assign_id(self, id: CourseId) -> Course {
        Course {
            id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            about: self.about,
            start_date: self.start_date,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub about: String,
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Case-insensitive match against name or description.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonDraft {
    pub course_id: CourseId,
    pub name: String,
    pub description: String,
    pub number: i32,
    pub release_date: Option<NaiveDate>,
}

impl LessonDraft {
    #[must_use]
    pub fn new(course_id: CourseId, name: impl Into<String>, number: i32) -> Self {
        Self {
            course_id,
            name: name.into(),
            description: String::new(),
            number,
            release_date: None,
        }
    }

    #[must_use]
    pub fn released_on(mut self, date: NaiveDate) -> Self {
        self.release_date = Some(date);
        self
    }

    /// # Errors
    ///
    /// Returns `CourseError` if the lesson name is invalid.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedLesson, CourseError> {
        Ok(ValidatedLesson {
            course_id: self.course_id,
            name: validated_name(self.name)?,
            description: self.description,
            number: self.number,
            release_date: self.release_date,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLesson {
    pub course_id: CourseId,
    pub name: String,
    pub description: String,
    pub number: i32,
    pub release_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl ValidatedLesson {
    #[must_use]
    pub fn assign_id(self, id: LessonId) -> Lesson {
        Lesson {
            id,
            course_id: self.course_id,
            name: self.name,
            description: self.description,
            number: self.number,
            release_date: self.release_date,
            created_at: self.created_at,
        }
    }
}

/// One entry of a course's lesson roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub name: String,
    pub description: String,
    pub number: i32,
    pub release_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    /// A lesson without a release date is always available.
    #[must_use]
    pub fn is_released(&self, today: NaiveDate) -> bool {
        self.release_date.is_none_or(|date| date <= today)
    }
}

/// Sorts lessons into roster order: by number, then id.
pub fn sort_roster(lessons: &mut [Lesson]) {
    lessons.sort_by_key(|l| (l.number, l.id));
}

//
// ─── MATERIAL ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub id: MaterialId,
    pub lesson_id: LessonId,
    pub name: String,
    pub embedded: Option<String>,
    pub file: Option<String>,
}

impl Material {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyName` for a blank name and
    /// `CourseError::EmptyMaterial` when neither embed nor file is given.
    pub fn new(
        id: MaterialId,
        lesson_id: LessonId,
        name: impl Into<String>,
        embedded: Option<String>,
        file: Option<String>,
    ) -> Result<Self, CourseError> {
        let embedded = embedded.filter(|e| !e.trim().is_empty());
        let file = file.filter(|f| !f.trim().is_empty());
        if embedded.is_none() && file.is_none() {
            return Err(CourseError::EmptyMaterial);
        }
        Ok(Self {
            id,
            lesson_id,
            name: validated_name(name.into())?,
            embedded,
            file,
        })
    }

    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.embedded.is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
