//! Decide whether the loaded resource is a regular page or an embedded PDF.

use tracing::{debug, warn};

use crate::bridge::RemoteFn;
use crate::content::ContentKind;
use crate::surface::Surface;

/// Outcome of classification, including how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The URL alone identifies a PDF; the page was not probed.
    DocumentUrl,
    /// The in-page probe found a PDF viewer.
    DocumentProbe,
    /// The probe found no PDF viewer.
    Html,
    /// The probe could not run. Treated as HTML, but a slow-loading PDF
    /// also ends up here.
    ProbeFailed { reason: String },
}

impl Classification {
    pub fn kind(&self) -> ContentKind {
        match self {
            Classification::DocumentUrl | Classification::DocumentProbe => {
                ContentKind::EmbeddedDocument
            }
            Classification::Html | Classification::ProbeFailed { .. } => ContentKind::Html,
        }
    }

    pub fn is_document(&self) -> bool {
        self.kind() == ContentKind::EmbeddedDocument
    }
}

/// URL fragments that mark a PDF or a PDF viewer page.
const URL_MARKERS: &[&str] = &[".pdf", "application/pdf", "viewer.html", "#page="];

/// Cheap check on the URL text alone.
pub fn url_suggests_document(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    URL_MARKERS.iter().any(|m| lower.contains(m))
}

static VIEWER_PROBE: RemoteFn = RemoteFn::new(
    "viewer_probe",
    r#"() => {
  return document.querySelector('embed[type="application/pdf"]') !== null ||
    document.querySelector('iframe[src*=".pdf"]') !== null ||
    document.querySelector('#viewer') !== null ||
    document.querySelector('.pdfViewer') !== null ||
    document.contentType === 'application/pdf' ||
    window.location.href.includes('viewer.html');
}"#,
);

/// Classify the resource at `url`, probing the live page only when the URL is
/// inconclusive. Probe failures fall back to HTML.
pub async fn classify(surface: &dyn Surface, url: &str) -> Classification {
    if url_suggests_document(url) {
        debug!("classified {} as PDF from its URL", url);
        return Classification::DocumentUrl;
    }

    match VIEWER_PROBE.call().execute::<bool>(surface).await {
        Ok(true) => {
            debug!("PDF viewer found on {}", url);
            Classification::DocumentProbe
        }
        Ok(false) => Classification::Html,
        Err(e) => {
            warn!("PDF detection failed on {}: {}", url, e);
            Classification::ProbeFailed {
                reason: e.to_string(),
            }
        }
    }
}
