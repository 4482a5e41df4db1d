use std::env;
use std::path::PathBuf;

/// Tunables for progress tracking and certificate issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Character width at which the course name wraps on the certificate.
    pub title_wrap_width: usize,
    /// Certificate number attempts before a collision is reported.
    pub max_number_attempts: u32,
    /// When false, certificates are issued without a rendered document.
    pub render_documents: bool,
    /// Directory holding rendered certificate documents.
    pub certificate_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title_wrap_width: 50,
            max_number_attempts: 5,
            render_documents: true,
            certificate_dir: PathBuf::from("certificates"),
        }
    }
}

impl EngineConfig {
    /// Read overrides from `COURSES_CERT_*` variables; unset or unparsable
    /// values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let title_wrap_width = lookup("COURSES_CERT_WRAP_WIDTH")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(defaults.title_wrap_width);
        let max_number_attempts = lookup("COURSES_CERT_MAX_ATTEMPTS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_number_attempts);
        let render_documents = lookup("COURSES_CERT_RENDER").map_or(defaults.render_documents, |v| {
            !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
        });
        let certificate_dir = lookup("COURSES_CERT_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or(defaults.certificate_dir, PathBuf::from);

        Self {
            title_wrap_width,
            max_number_attempts,
            render_documents,
            certificate_dir,
        }
    }
}
