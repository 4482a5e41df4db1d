mod announcement;
mod certificate;
mod course;
mod enrollment;
mod ids;
mod progress;
mod user;

pub use ids::{
    AnnouncementId, CertificateId, CommentId, CourseId, CourseProgressId, EnrollmentId, LessonId,
    MaterialId, ParseIdError, UserId,
};

pub use announcement::{
    Announcement, AnnouncementDraft, AnnouncementError, Comment, ValidatedAnnouncement,
    comment_text,
};
pub use certificate::{
    CERTIFICATE_NUMBER_LEN, Certificate, CertificateError, CertificateNumber, NewCertificate,
    wrap_text,
};
pub use course::{
    Course, CourseDraft, CourseError, Lesson, LessonDraft, Material, ValidatedCourse,
    ValidatedLesson, slugify, sort_roster,
};
pub use enrollment::{Enrollment, EnrollmentError, EnrollmentStatus};
pub use progress::{CourseProgress, LessonCompletion, ProgressError, progress_percentage};
pub use user::{UserError, UserProfile};
