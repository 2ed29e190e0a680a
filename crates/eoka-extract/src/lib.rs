//! # eoka-extract
//!
//! Content extraction for AI agents driving a single browser tab. Runs
//! host-issued functions inside the page and turns whatever is loaded (an HTML
//! page or an embedded PDF) into one [`ContentRecord`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_extract::{BrowserAgent, Config, EokaSurface};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_extract::Result<()> {
//! let config = Config::default();
//! let surface = EokaSurface::launch(&config.browser).await?;
//! let agent = BrowserAgent::new(surface, &config.extraction);
//!
//! agent.navigate_to("https://example.com/report.pdf").await?;
//! let record = agent.extract_page_content().await;
//! println!("{}", record.body);
//!
//! agent.into_surface().close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! extract_page_content
//!   └─ classify (url heuristic, then one in-page probe)
//!        ├─ embedded document → locate → validate → bootstrap pdf.js → open → pages → aggregate
//!        └─ html              → visible body text
//! ```
//!
//! Extraction never fails with an error: problems come back as a record with
//! `is_error` set and an explanatory body.

pub mod agent;
pub mod bridge;
pub mod classify;
pub mod config;
pub mod content;
pub mod pdf;
pub mod surface;

pub use agent::{BrowserAgent, PageRef, Screenshot};
pub use bridge::{RemoteFn, RemoteInvocation};
pub use classify::Classification;
pub use config::{BrowserConfig, Config, ExtractionConfig, LibraryConfig};
pub use content::{ContentKind, ContentRecord};
pub use pdf::{BootstrapOutcome, BootstrapState, DocumentExtractor, PageExtractionOutcome};
pub use surface::{EokaSurface, Surface, SurfaceInfo};

/// Result type for eoka-extract operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the bridge, the PDF pipeline and configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("remote execution failed: {0}")]
    RemoteExecution(String),

    /// The surface could not run the script at all: tab closed, target gone,
    /// execution context destroyed.
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("failed to load PDF library: {0}")]
    LibraryBootstrap(String),

    #[error("failed to open PDF document: {0}")]
    DocumentOpen(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
