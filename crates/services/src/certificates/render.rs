use chrono::{Datelike, NaiveDate};
use course_core::model::{CertificateNumber, wrap_text};
use thiserror::Error;

use super::pdf::{Font, PdfPage};

/// Errors emitted by certificate renderers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// The renderer cannot produce documents in this deployment.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
    #[error("rendering failed: {0}")]
    Failed(String),
}

/// Everything printed on a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    pub recipient: String,
    pub course_name: String,
    pub issued_on: NaiveDate,
    pub number: CertificateNumber,
}

/// Produces the document bytes for an issued certificate.
pub trait CertificateRenderer: Send + Sync {
    /// # Errors
    ///
    /// Returns `RenderError::Unavailable` when rendering is not possible at all
    /// and `RenderError::Failed` for a failure specific to these fields.
    fn render(&self, fields: &CertificateFields) -> Result<Vec<u8>, RenderError>;
}

/// Renderer for deployments that issue certificates without documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRenderer;

impl CertificateRenderer for DisabledRenderer {
    fn render(&self, _fields: &CertificateFields) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Unavailable("document rendering is disabled".into()))
    }
}

const MONTHS_PT: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// `14 de novembro de 2023`
#[must_use]
pub fn format_issue_date(date: NaiveDate) -> String {
    let month = MONTHS_PT
        .get(date.month0() as usize)
        .copied()
        .unwrap_or_default();
    format!("{:02} de {month} de {}", date.day(), date.year())
}

/// Landscape A4 certificate drawn with the built-in Helvetica faces.
#[derive(Debug, Clone)]
pub struct PdfCertificateRenderer {
    title_wrap_width: usize,
}

impl PdfCertificateRenderer {
    #[must_use]
    pub fn new(title_wrap_width: usize) -> Self {
        Self {
            title_wrap_width: title_wrap_width.max(1),
        }
    }
}

impl Default for PdfCertificateRenderer {
    fn default() -> Self {
        Self::new(50)
    }
}

const INK: &str = "#2c3e50";
const ACCENT: &str = "#2980b9";

impl CertificateRenderer for PdfCertificateRenderer {
    fn render(&self, fields: &CertificateFields) -> Result<Vec<u8>, RenderError> {
        if fields.recipient.trim().is_empty() {
            return Err(RenderError::Failed("recipient name is empty".into()));
        }

        let mut page = PdfPage::landscape_a4();
        let (width, height) = (page.width(), page.height());

        page.fill_color("#f5f5f5");
        page.fill_rect(0.0, 0.0, width, height);
        page.stroke_color(INK);
        page.rect(20.0, 20.0, width - 40.0, height - 40.0, 3.0);

        page.fill_color(INK);
        page.centered_text(Font::Bold, 48.0, height - 80.0, "CERTIFICADO DE CONCLUSÃO");
        page.fill_color("#34495e");
        page.centered_text(Font::Bold, 24.0, height - 130.0, "de");

        page.fill_color(ACCENT);
        let mut y = height - 170.0;
        for line in wrap_text(&fields.course_name, self.title_wrap_width) {
            page.centered_text(Font::Bold, 28.0, y, &line);
            y -= 30.0;
        }

        page.fill_color(INK);
        page.centered_text(Font::Regular, 16.0, height - 250.0, "Certificamos que");
        page.fill_color(ACCENT);
        page.centered_text(Font::Bold, 22.0, height - 290.0, &fields.recipient);

        page.fill_color(INK);
        page.centered_text(
            Font::Regular,
            14.0,
            height - 330.0,
            "Completou com êxito todas as atividades propostas no curso acima mencionado,",
        );
        page.centered_text(
            Font::Regular,
            14.0,
            height - 355.0,
            "demonstrando aptidão e compromisso com a educação continuada.",
        );

        page.text(
            Font::Regular,
            12.0,
            50.0,
            80.0,
            &format!("Emitido em: {}", format_issue_date(fields.issued_on)),
        );
        page.text(
            Font::Regular,
            12.0,
            50.0,
            60.0,
            &format!("Número: {}", fields.number),
        );

        page.line(width - 170.0, 98.0, width - 30.0, 98.0, 0.8);
        page.text_centered_at(Font::Oblique, 10.0, width - 100.0, 80.0, "Administração");

        Ok(page.finish(&format!("Certificado {}", fields.number)))
    }
}
