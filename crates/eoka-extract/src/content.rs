//! The normalized extraction result, and the plain HTML extraction path.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bridge::RemoteFn;
use crate::surface::Surface;

/// What kind of content a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Html,
    /// A PDF rendered by the browser's document viewer.
    EmbeddedDocument,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Html => write!(f, "HTML"),
            ContentKind::EmbeddedDocument => write!(f, "PDF"),
        }
    }
}

/// Extracted page content. `body` is never empty; failures carry their
/// explanation there and set `is_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    pub title: String,
    pub source_url: String,
    pub body: String,
    pub content_kind: ContentKind,
    pub is_error: bool,
    /// Page count of the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_units: Option<u32>,
    /// Pages actually read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_units: Option<u32>,
}

pub(crate) const EMPTY_HTML_BODY: &str = "The page has no visible text.";
pub(crate) const EMPTY_FAILURE_BODY: &str = "Content extraction failed for an unknown reason.";

impl ContentRecord {
    /// Successful extraction.
    pub fn new(
        content_kind: ContentKind,
        title: impl Into<String>,
        source_url: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        Self {
            title: title.into(),
            source_url: source_url.into(),
            body: if body.trim().is_empty() {
                EMPTY_HTML_BODY.to_string()
            } else {
                body
            },
            content_kind,
            is_error: false,
            total_units: None,
            extracted_units: None,
        }
    }

    /// Extraction that could not proceed.
    pub fn failure(
        content_kind: ContentKind,
        title: impl Into<String>,
        source_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            is_error: true,
            body: if message.trim().is_empty() {
                EMPTY_FAILURE_BODY.to_string()
            } else {
                message
            },
            ..Self::new(content_kind, title, source_url, "")
        }
    }

    /// Attach page counts.
    pub fn with_units(mut self, total: u32, extracted: u32) -> Self {
        self.total_units = Some(total);
        self.extracted_units = Some(extracted);
        self
    }
}

#[derive(Debug, Deserialize)]
struct HtmlSnapshot {
    title: String,
    url: String,
    text: String,
}

static HTML_TEXT: RemoteFn = RemoteFn::new(
    "html_text",
    r#"() => {
  const body = document.body ? document.body.cloneNode(true) : null;
  if (body) {
    body.querySelectorAll('script, style, noscript, template').forEach((n) => n.remove());
  }
  const raw = body ? (body.innerText || body.textContent || '') : '';
  const text = raw
    .split('\n')
    .map((line) => line.replace(/[ \t\u00a0]+/g, ' ').trim())
    .filter((line, i, lines) => line || (i > 0 && lines[i - 1]))
    .join('\n')
    .trim();
  return { title: document.title || '', url: window.location.href, text };
}"#,
);

/// Visible text of a regular web page.
///
/// Never fails: if the page cannot be read the record says so. This keeps a
/// PDF that slipped past classification from crashing the caller.
pub async fn extract_html(surface: &dyn Surface) -> ContentRecord {
    match HTML_TEXT.call().execute::<HtmlSnapshot>(surface).await {
        Ok(snap) => ContentRecord::new(ContentKind::Html, snap.title, snap.url, snap.text),
        Err(e) => {
            warn!("HTML extraction failed: {}", e);
            let title = surface.current_title().await.unwrap_or_default();
            let url = surface.current_location().await.unwrap_or_default();
            ContentRecord::failure(
                ContentKind::Html,
                title,
                url,
                format!("Page content extraction failed: {}", e),
            )
        }
    }
}
