//! Page-by-page PDF text extraction.

use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::bootstrap::{BootstrapState, Bootstrapper};
use super::locate::{self, PageCandidates, COLLECT_CANDIDATES};
use super::FALLBACK_TITLE;
use crate::bridge::RemoteFn;
use crate::config::ExtractionConfig;
use crate::content::{ContentKind, ContentRecord};
use crate::surface::Surface;
use crate::{Error, Result};

/// Body used when validation rejects the document URL.
pub const NOT_A_DOCUMENT_BODY: &str = "The current page cannot be parsed as a PDF document. \
It may still be loading or may not contain a PDF. Try again shortly or check that the page displays the document.";

/// Body used when a document opened but yielded no text.
pub const NO_TEXT_BODY: &str = "No text could be extracted from this PDF document.";

/// Thrown by the in-page open call when `pdfjsLib` is gone.
const LIBRARY_MISSING: &str = "pdfjsLib is not loaded";

/// Text extracted from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtractionOutcome {
    /// 1-based page number.
    pub unit_index: u32,
    /// Page text, or the failure message when `failed`.
    pub text: String,
    pub failed: bool,
}

impl PageExtractionOutcome {
    /// Banner plus text, or nothing for a page without text.
    fn contribution(&self) -> Option<String> {
        let text = if self.failed {
            format!("[page extraction failed: {}]", self.text)
        } else if self.text.trim().is_empty() {
            return None;
        } else {
            self.text.trim().to_string()
        };
        Some(format!("\n--- page {} ---\n{}\n", self.unit_index, text))
    }
}

/// Which pages to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRange {
    /// Upper bound on pages read; `None` reads the whole document.
    pub max_pages: Option<u32>,
}

impl PageRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(max_pages: u32) -> Self {
        Self {
            max_pages: Some(max_pages),
        }
    }

    /// Page numbers to visit in a document of `total` pages.
    pub fn pages(&self, total: u32) -> RangeInclusive<u32> {
        let last = self.max_pages.map_or(total, |m| m.min(total));
        1..=last
    }
}

static OPEN_DOCUMENT: RemoteFn = RemoteFn::new(
    "pdf_open",
    r#"async (url, cMapUrl) => {
  const lib = window.pdfjsLib;
  if (!lib) {
    throw new Error('pdfjsLib is not loaded');
  }
  const previous = window.__eokaPdf;
  if (previous && previous.doc) {
    try { await previous.doc.destroy(); } catch (_) {}
  }
  const doc = await lib.getDocument({ url, cMapUrl, cMapPacked: true }).promise;
  window.__eokaPdf = { url, doc };
  return doc.numPages;
}"#,
);

static PAGE_TEXT: RemoteFn = RemoteFn::new(
    "pdf_page_text",
    r#"async (pageNumber) => {
  const slot = window.__eokaPdf;
  if (!slot || !slot.doc) {
    throw new Error('no open PDF document');
  }
  const page = await slot.doc.getPage(pageNumber);
  const content = await page.getTextContent();
  page.cleanup();
  return content.items.map((item) => (typeof item.str === 'string' ? item.str : ''));
}"#,
);

static CLOSE_DOCUMENT: RemoteFn = RemoteFn::new(
    "pdf_close",
    r#"async () => {
  const slot = window.__eokaPdf;
  window.__eokaPdf = undefined;
  if (slot && slot.doc) {
    await slot.doc.destroy();
  }
  return true;
}"#,
);

/// Join a page's text items, dropping empty and whitespace-only fragments.
pub fn join_fragments(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Concatenate page contributions in order.
pub fn aggregate(pages: &[PageExtractionOutcome]) -> String {
    let full: String = pages.iter().filter_map(|p| p.contribution()).collect();
    if full.trim().is_empty() {
        NO_TEXT_BODY.to_string()
    } else {
        full.trim_start().to_string()
    }
}

/// Extracts text from the PDF shown in a surface.
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    bootstrapper: Bootstrapper,
    range: PageRange,
}

impl DocumentExtractor {
    pub fn new(config: &ExtractionConfig, state: Arc<BootstrapState>) -> Self {
        Self {
            bootstrapper: Bootstrapper::new(config.library.clone(), state),
            range: PageRange {
                max_pages: config.max_pages,
            },
        }
    }

    pub fn with_range(mut self, range: PageRange) -> Self {
        self.range = range;
        self
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrapper
    }

    /// Extract the document. Always returns a record: failures are reported
    /// with `is_error` set and the message as the body.
    pub async fn extract(&self, surface: &dyn Surface) -> ContentRecord {
        match self.try_extract(surface).await {
            Ok(record) => record,
            Err(e) => {
                error!("PDF extraction failed: {}", e);
                let title = surface
                    .current_title()
                    .await
                    .ok()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_TITLE.to_string());
                let url = surface.current_location().await.unwrap_or_default();
                ContentRecord::failure(
                    ContentKind::EmbeddedDocument,
                    title,
                    url,
                    format!("PDF content extraction failed: {}", e),
                )
            }
        }
    }

    async fn try_extract(&self, surface: &dyn Surface) -> Result<ContentRecord> {
        let candidates: PageCandidates = COLLECT_CANDIDATES.call().execute(surface).await?;
        let title = if candidates.title.trim().is_empty() {
            FALLBACK_TITLE.to_string()
        } else {
            candidates.title.clone()
        };

        let pdf_url = locate::resolve(&candidates);
        if let Err(reason) = locate::validate(&pdf_url, &candidates.location) {
            warn!("no usable PDF URL on {}: {}", candidates.location, reason);
            return Ok(ContentRecord::new(
                ContentKind::EmbeddedDocument,
                title,
                candidates.location,
                NOT_A_DOCUMENT_BODY,
            ));
        }
        info!("parsing PDF {}", pdf_url);

        let total = self.open(surface, &pdf_url).await?;
        info!("PDF opened, {} pages", total);

        let pages = self.read_pages(surface, total).await?;
        let extracted = pages.len() as u32;

        if let Err(e) = CLOSE_DOCUMENT.call().execute::<bool>(surface).await {
            debug!("releasing PDF handle failed: {}", e);
        }

        let body = aggregate(&pages);
        info!(
            "PDF extraction complete: {}/{} pages, {} chars",
            extracted,
            total,
            body.len()
        );
        Ok(
            ContentRecord::new(ContentKind::EmbeddedDocument, title, pdf_url, body)
                .with_units(total, extracted),
        )
    }

    /// Bootstrap and open, retrying once if the page lost the library since
    /// it was last bootstrapped (a reload to the same URL).
    async fn open(&self, surface: &dyn Surface, url: &str) -> Result<u32> {
        self.bootstrapper.ensure(surface).await?;
        match self.open_once(surface, url).await {
            Err(Error::DocumentOpen(msg)) if msg.contains(LIBRARY_MISSING) => {
                debug!("pdf.js missing after bootstrap, reloading it");
                self.bootstrapper.state().clear().await;
                self.bootstrapper.ensure(surface).await?;
                self.open_once(surface, url).await
            }
            other => other,
        }
    }

    async fn open_once(&self, surface: &dyn Surface, url: &str) -> Result<u32> {
        let cmap_url = self.bootstrapper.library().cmap_url();
        OPEN_DOCUMENT
            .call()
            .arg(url)?
            .arg(&cmap_url)?
            .execute(surface)
            .await
            .map_err(|e| match e {
                Error::RemoteExecution(msg) => Error::DocumentOpen(msg),
                other => other,
            })
    }

    /// Read pages strictly in order. A page that throws is recorded and
    /// skipped; losing the surface ends the whole read.
    async fn read_pages(
        &self,
        surface: &dyn Surface,
        total: u32,
    ) -> Result<Vec<PageExtractionOutcome>> {
        let mut pages = Vec::new();
        for n in self.range.pages(total) {
            let outcome = PAGE_TEXT
                .call()
                .arg(&n)?
                .execute::<Vec<String>>(surface)
                .await;
            match outcome {
                Ok(items) => {
                    debug!("page {} extracted ({} items)", n, items.len());
                    pages.push(PageExtractionOutcome {
                        unit_index: n,
                        text: join_fragments(&items),
                        failed: false,
                    });
                }
                Err(e @ Error::SurfaceUnavailable(_)) => {
                    error!("surface lost at page {} of {}", n, total);
                    return Err(e);
                }
                Err(e) => {
                    warn!("page {} extraction failed: {}", n, e);
                    pages.push(PageExtractionOutcome {
                        unit_index: n,
                        text: page_error_message(&e),
                        failed: true,
                    });
                }
            }
        }
        Ok(pages)
    }
}

/// The in-page message without our `remote execution failed: <fn>:` prefix.
fn page_error_message(e: &Error) -> String {
    match e {
        Error::RemoteExecution(msg) => msg
            .strip_prefix(PAGE_TEXT.name())
            .and_then(|m| m.strip_prefix(": "))
            .unwrap_or(msg)
            .to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::scripted::{Reply, ScriptedSurface};
    use serde_json::{json, Value};

    fn pdf_page(location: &str) -> Reply {
        Reply::Value(json!({
            "location": location,
            "title": "report.pdf",
            "pdfEmbed": null,
            "pdfIframe": null,
            "embeds": [],
            "iframes": []
        }))
    }

    /// A surface showing `location` with a document whose pages are produced
    /// by `page`.
    fn document(
        location: &'static str,
        total: u32,
        page: impl Fn(u64) -> Reply + Send + Sync + 'static,
    ) -> ScriptedSurface {
        ScriptedSurface::new(location)
            .titled("report.pdf")
            .on("pdf_candidates", move |_| pdf_page(location))
            .on("ensure_pdfjs", |_| Reply::Value(json!("injected")))
            .on("pdf_open", move |_| Reply::Value(json!(total)))
            .on("pdf_page_text", move |args: &[Value]| page(args[0].as_u64().unwrap()))
            .on("pdf_close", |_| Reply::Value(json!(true)))
    }

    fn extractor() -> DocumentExtractor {
        DocumentExtractor::new(&ExtractionConfig::default(), Arc::new(BootstrapState::new()))
    }

    #[test]
    fn test_join_fragments_drops_blank_items() {
        let items = vec![
            "Quarterly".to_string(),
            " ".to_string(),
            "".to_string(),
            "report".to_string(),
            "\n".to_string(),
        ];
        assert_eq!(join_fragments(&items), "Quarterly report");
    }

    #[test]
    fn test_page_range() {
        assert_eq!(PageRange::all().pages(3), 1..=3);
        assert_eq!(PageRange::first(2).pages(10), 1..=2);
        assert_eq!(PageRange::first(20).pages(4), 1..=4);
        assert!(PageRange::all().pages(0).is_empty());
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(aggregate(&[]), NO_TEXT_BODY);
        let blank = PageExtractionOutcome {
            unit_index: 1,
            text: "   ".into(),
            failed: false,
        };
        assert_eq!(aggregate(&[blank]), NO_TEXT_BODY);
    }

    #[tokio::test]
    async fn test_failing_page_is_isolated() {
        let surface = document("https://files.example.com/report.pdf", 3, |n| match n {
            1 => Reply::Value(json!(["Intro"])),
            2 => Reply::Throw("Invalid XRef stream".into()),
            _ => Reply::Value(json!(["Conclusion"])),
        });

        let record = extractor().extract(&surface).await;
        assert!(!record.is_error);
        assert_eq!(record.content_kind, ContentKind::EmbeddedDocument);
        assert_eq!(
            record.body,
            "--- page 1 ---\nIntro\n\n--- page 2 ---\n[page extraction failed: Invalid XRef stream]\n\n--- page 3 ---\nConclusion\n"
        );
        assert_eq!(record.total_units, Some(3));
        assert_eq!(record.extracted_units, Some(3));
        assert_eq!(record.source_url, "https://files.example.com/report.pdf");
    }

    #[tokio::test]
    async fn test_pages_read_in_order() {
        let surface = document("https://a.test/long.pdf", 12, |n| {
            Reply::Value(json!([format!("text of page {}", n)]))
        });
        let record = extractor().extract(&surface).await;

        let pages: Vec<Value> = surface.calls_named("pdf_page_text").into_iter().map(|a| a[0].clone()).collect();
        assert_eq!(pages, (1..=12).map(|n| json!(n)).collect::<Vec<_>>());

        let mut last = 0;
        for n in 1..=12 {
            let pos = record.body.find(&format!("--- page {} ---\ntext of page {}\n", n, n)).unwrap();
            assert!(pos >= last);
            last = pos;
        }
    }

    #[tokio::test]
    async fn test_page_without_text_adds_nothing() {
        let surface = document("https://a.test/scan.pdf", 2, |n| match n {
            1 => Reply::Value(json!(["", "  "])),
            _ => Reply::Value(json!(["Appendix"])),
        });
        let record = extractor().extract(&surface).await;
        assert_eq!(record.body, "--- page 2 ---\nAppendix\n");
        assert_eq!(record.extracted_units, Some(2));
    }

    #[tokio::test]
    async fn test_empty_document_body() {
        let surface = document("https://a.test/blank.pdf", 1, |_| Reply::Value(json!([])));
        let record = extractor().extract(&surface).await;
        assert!(!record.is_error);
        assert_eq!(record.body, NO_TEXT_BODY);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let surface = document("https://a.test/long.pdf", 50, |_| Reply::Value(json!(["x"])));
        let record = extractor().with_range(PageRange::first(3)).extract(&surface).await;
        assert_eq!(surface.calls_named("pdf_page_text").len(), 3);
        assert_eq!(record.total_units, Some(50));
        assert_eq!(record.extracted_units, Some(3));
    }

    #[tokio::test]
    async fn test_blank_page_is_soft_failure() {
        let surface = ScriptedSurface::new("about:blank")
            .titled("")
            .on("pdf_candidates", |_| pdf_page("about:blank"));
        let record = extractor().extract(&surface).await;
        assert!(!record.is_error);
        assert_eq!(record.body, NOT_A_DOCUMENT_BODY);
        assert_eq!(record.source_url, "about:blank");
        assert_eq!(record.total_units, None);
        assert_eq!(surface.calls(), vec!["pdf_candidates"]);
    }

    #[tokio::test]
    async fn test_nested_document_on_blank_page() {
        let surface = ScriptedSurface::new("about:blank")
            .on("pdf_candidates", |_| {
                Reply::Value(json!({
                    "location": "about:blank",
                    "title": "",
                    "pdfEmbed": null,
                    "pdfIframe": null,
                    "embeds": [],
                    "iframes": ["https://a.test/nested.pdf"]
                }))
            })
            .on("ensure_pdfjs", |_| Reply::Value(json!("injected")))
            .on("pdf_open", |_| Reply::Value(json!(1)))
            .on("pdf_page_text", |_| Reply::Value(json!(["nested"])))
            .on("pdf_close", |_| Reply::Value(json!(true)));
        let record = extractor().extract(&surface).await;
        assert_eq!(record.source_url, "https://a.test/nested.pdf");
        assert_eq!(surface.calls_named("pdf_open")[0][0], "https://a.test/nested.pdf");
        assert_eq!(record.body, "--- page 1 ---\nnested\n");
    }

    #[tokio::test]
    async fn test_open_failure_is_error_record() {
        let surface = document("https://a.test/broken.pdf", 0, |_| Reply::Value(json!([])))
            .on("pdf_open", |_| Reply::Throw("Invalid PDF structure.".into()));
        let record = extractor().extract(&surface).await;
        assert!(record.is_error);
        assert_eq!(record.content_kind, ContentKind::EmbeddedDocument);
        assert_eq!(record.title, "report.pdf");
        assert_eq!(record.source_url, "https://a.test/broken.pdf");
        assert!(record.body.contains("Invalid PDF structure."), "{}", record.body);
        assert!(surface.calls_named("pdf_page_text").is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_error_record() {
        let surface = document("https://a.test/r.pdf", 1, |_| Reply::Value(json!([])))
            .on("ensure_pdfjs", |_| Reply::Throw("could not load pdf.min.js".into()));
        let record = extractor().extract(&surface).await;
        assert!(record.is_error);
        assert!(record.body.contains("could not load pdf.min.js"));
        assert!(surface.calls_named("pdf_open").is_empty());
    }

    #[tokio::test]
    async fn test_bridge_failure_is_error_record() {
        let surface = ScriptedSurface::new("https://a.test/r.pdf")
            .titled("")
            .on("pdf_candidates", |_| Reply::Fail("Target closed".into()));
        let record = extractor().extract(&surface).await;
        assert!(record.is_error);
        assert_eq!(record.title, FALLBACK_TITLE);
        assert_eq!(record.source_url, "https://a.test/r.pdf");
        assert!(record.body.contains("Target closed"));
    }

    #[tokio::test]
    async fn test_surface_lost_mid_document_is_error_record() {
        let surface = document("https://a.test/r.pdf", 4, |n| match n {
            1 => Reply::Value(json!(["Intro"])),
            _ => Reply::Fail("Target closed".into()),
        });
        let record = extractor().extract(&surface).await;
        assert!(record.is_error);
        assert!(record.body.contains("Target closed"), "{}", record.body);
        assert!(!record.body.contains("--- page"), "{}", record.body);
        assert_eq!(surface.calls_named("pdf_page_text").len(), 2);
    }

    #[tokio::test]
    async fn test_library_lost_after_reload_is_reloaded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let opens = Arc::new(AtomicUsize::new(0));
        let counter = opens.clone();
        let surface = document("https://a.test/r.pdf", 1, |_| Reply::Value(json!(["ok"])))
            .on("pdf_open", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Reply::Throw(LIBRARY_MISSING.into())
                } else {
                    Reply::Value(json!(1))
                }
            });
        let state = Arc::new(BootstrapState::loaded_at("https://a.test/r.pdf"));
        let record = DocumentExtractor::new(&ExtractionConfig::default(), state)
            .extract(&surface)
            .await;

        assert!(!record.is_error, "{}", record.body);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(surface.calls_named("ensure_pdfjs").len(), 1);
    }

    #[tokio::test]
    async fn test_second_extraction_reuses_library() {
        let surface = document("https://a.test/r.pdf", 1, |_| Reply::Value(json!(["ok"])));
        let ex = extractor();
        ex.extract(&surface).await;
        ex.extract(&surface).await;
        assert_eq!(surface.calls_named("ensure_pdfjs").len(), 1);
        assert_eq!(surface.calls_named("pdf_open").len(), 2);
    }
}
