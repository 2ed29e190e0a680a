//! PDF text extraction through pdf.js running inside the page.
//!
//! The browser's built-in viewer exposes no text, so the extractor loads
//! pdf.js into the page on demand, opens the document there, and pulls text
//! one page at a time:
//!
//! - [`locate`] works out which URL actually holds the PDF
//! - [`bootstrap`] makes sure pdf.js is loaded, once per page load
//! - [`extract`] opens the document, walks the pages and builds the record

pub mod bootstrap;
pub mod extract;
pub mod locate;

pub use bootstrap::{BootstrapOutcome, BootstrapState, Bootstrapper};
pub use extract::{DocumentExtractor, PageExtractionOutcome, PageRange};
pub use locate::{PageCandidates, Unresolvable};

/// Title used when the page does not have one.
pub(crate) const FALLBACK_TITLE: &str = "PDF document";
