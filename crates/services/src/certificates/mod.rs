//! Certificate issuance and document rendering.

mod issuer;
pub mod pdf;
mod render;

pub use issuer::CertificateIssuer;
pub use render::{
    CertificateFields, CertificateRenderer, DisabledRenderer, PdfCertificateRenderer, RenderError,
    format_issue_date,
};
