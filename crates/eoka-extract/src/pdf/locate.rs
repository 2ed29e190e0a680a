//! Finding the URL of the PDF behind the current page.
//!
//! The page location is often not the document itself: viewers wrap it in an
//! `<embed>` or `<iframe>`, or carry it in a `src`/`file` query parameter, and
//! some hosts leave the tab on `about:blank` with the document nested inside.

use serde::Deserialize;
use url::Url;

use crate::bridge::RemoteFn;

/// Candidate sources gathered from the live DOM.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCandidates {
    /// `window.location.href`.
    pub location: String,
    #[serde(default)]
    pub title: String,
    /// `src` of the first `embed[type="application/pdf"]`.
    #[serde(default)]
    pub pdf_embed: Option<String>,
    /// `src` of the first `iframe[src*=".pdf"]`.
    #[serde(default)]
    pub pdf_iframe: Option<String>,
    /// `src` of every `embed`, in document order.
    #[serde(default)]
    pub embeds: Vec<String>,
    /// `src` of every `iframe`, in document order.
    #[serde(default)]
    pub iframes: Vec<String>,
}

pub(crate) static COLLECT_CANDIDATES: RemoteFn = RemoteFn::new(
    "pdf_candidates",
    r#"() => {
  const src = (el) => (el && el.src) || null;
  return {
    location: window.location.href,
    title: document.title || '',
    pdfEmbed: src(document.querySelector('embed[type="application/pdf"]')),
    pdfIframe: src(document.querySelector('iframe[src*=".pdf"]')),
    embeds: Array.from(document.querySelectorAll('embed')).map(src).filter(Boolean),
    iframes: Array.from(document.querySelectorAll('iframe')).map(src).filter(Boolean),
  };
}"#,
);

/// Why a resolved locator cannot be opened as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolvable {
    Blank,
    AboutPage(String),
    /// Fell back to the page's own URL, which does not name a PDF.
    NotADocument(String),
}

impl std::fmt::Display for Unresolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unresolvable::Blank => write!(f, "no document URL found"),
            Unresolvable::AboutPage(u) => write!(f, "document URL is {}", u),
            Unresolvable::NotADocument(u) => write!(f, "{} does not point at a PDF", u),
        }
    }
}

fn is_about(src: &str) -> bool {
    src.starts_with("about:")
}

fn usable(src: &str) -> bool {
    !src.is_empty() && !is_about(src)
}

pub(crate) fn has_pdf_marker(src: &str) -> bool {
    src.to_ascii_lowercase().contains(".pdf")
}

/// `src` or `file` query parameter of a viewer page, decoded.
fn viewer_target(location: &str) -> Option<String> {
    if !location.contains("viewer.html") {
        return None;
    }
    let url = Url::parse(location).ok()?;
    let param = |key: &str| {
        url.query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    };
    param("src").or_else(|| param("file"))
}

/// Pick the document URL. First match wins:
///
/// 1. PDF `embed`
/// 2. PDF `iframe`
/// 3. viewer page `src` / `file` parameter
/// 4. on a blank page, any `embed` then any `iframe` whose source names a PDF
/// 5. the page location itself
pub fn resolve(c: &PageCandidates) -> String {
    if let Some(src) = c.pdf_embed.as_deref().filter(|s| usable(s)) {
        return src.to_string();
    }
    if let Some(src) = c.pdf_iframe.as_deref().filter(|s| usable(s)) {
        return src.to_string();
    }
    if let Some(src) = viewer_target(&c.location) {
        return src;
    }
    if c.location.is_empty() || is_about(&c.location) {
        let nested = c
            .embeds
            .iter()
            .chain(c.iframes.iter())
            .find(|s| usable(s) && has_pdf_marker(s));
        if let Some(src) = nested {
            return src.clone();
        }
    }
    c.location.clone()
}

/// Check that `resolved` can be handed to the PDF library.
pub fn validate(resolved: &str, location: &str) -> Result<(), Unresolvable> {
    if resolved.trim().is_empty() {
        return Err(Unresolvable::Blank);
    }
    if is_about(resolved) {
        return Err(Unresolvable::AboutPage(resolved.to_string()));
    }
    if resolved == location && !has_pdf_marker(resolved) {
        return Err(Unresolvable::NotADocument(resolved.to_string()));
    }
    Ok(())
}
