//! Agent-facing tool operations over one browsing surface.
//!
//! The core loop is: `navigate_to()` → `extract_page_content()`, with
//! `execute_script()` for anything the built-in extraction does not cover.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::bridge::RemoteFn;
use crate::classify::{self, Classification};
use crate::config::ExtractionConfig;
use crate::content::{self, ContentKind, ContentRecord};
use crate::pdf::{BootstrapState, DocumentExtractor};
use crate::surface::{Surface, SurfaceInfo};
use crate::{Error, Result};

/// Screenshot as a data URL.
#[derive(Debug, Clone, Serialize)]
pub struct Screenshot {
    pub image_base64: String,
    pub image_type: &'static str,
}

/// Where the surface ended up after navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub url: String,
    pub title: String,
}

/// Wraps a [`Surface`] with the operations an agent's tool layer dispatches to.
pub struct BrowserAgent<S> {
    surface: S,
    extractor: DocumentExtractor,
    settle: Duration,
}

impl<S: Surface> BrowserAgent<S> {
    pub fn new(surface: S, config: &ExtractionConfig) -> Self {
        Self::with_state(surface, config, Arc::new(BootstrapState::new()))
    }

    /// Share a bootstrap state, or start from a known one.
    pub fn with_state(surface: S, config: &ExtractionConfig, state: Arc<BootstrapState>) -> Self {
        Self {
            surface,
            extractor: DocumentExtractor::new(config, state),
            settle: Duration::from_millis(config.settle_ms),
        }
    }

    /// Get a reference to the underlying surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    async fn settle(&self) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }

    /// Capture the viewport.
    pub async fn screenshot(&self) -> Result<Screenshot> {
        let png = self.surface.capture_image().await?;
        Ok(Screenshot {
            image_base64: format!("data:image/png;base64,{}", BASE64.encode(&png)),
            image_type: "image/png",
        })
    }

    /// Load `url` and report where the surface landed.
    pub async fn navigate_to(&self, url: &str) -> Result<PageRef> {
        self.surface.load_location(url).await?;
        self.settle().await;
        Ok(PageRef {
            url: self.surface.current_location().await?,
            title: self.surface.current_title().await?,
        })
    }

    /// Run `function_source` (a JavaScript function expression) in the page
    /// with `args` and return what it resolves to.
    pub async fn execute_script(&self, function_source: &str, args: Vec<Value>) -> Result<Value> {
        let func = RemoteFn::dynamic("execute_script", function_source);
        func.call().args(args).execute(&self.surface).await
    }

    /// The surfaces this agent can see. Always exactly one.
    pub async fn list_tabs(&self) -> Result<Vec<SurfaceInfo>> {
        self.surface.list_open_surfaces().await
    }

    /// There is only one surface, so every id resolves to it.
    pub async fn switch_tab(&self, tab_id: u32) -> Result<SurfaceInfo> {
        debug!("switch_tab({}) on a single-surface agent", tab_id);
        self.list_tabs()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::SurfaceUnavailable("no open surface".into()))
    }

    /// Go back one history entry, if there is one.
    pub async fn go_back(&self) -> Result<bool> {
        if !self.surface.can_go_back().await? {
            return Ok(false);
        }
        self.surface.go_back().await?;
        self.settle().await;
        Ok(true)
    }

    /// Classify what is loaded.
    pub async fn classify(&self) -> Result<Classification> {
        let url = self.surface.current_location().await?;
        Ok(classify::classify(&self.surface, &url).await)
    }

    /// Extract the content of whatever is loaded, PDF or HTML.
    ///
    /// Never fails; see [`ContentRecord`].
    pub async fn extract_page_content(&self) -> ContentRecord {
        let classification = match self.classify().await {
            Ok(c) => c,
            Err(e) => {
                return ContentRecord::failure(
                    ContentKind::Html,
                    "",
                    "",
                    format!("Could not read the current page: {}", e),
                )
            }
        };
        info!("extracting page content ({:?})", classification);

        if classification.is_document() {
            self.extractor.extract(&self.surface).await
        } else {
            content::extract_html(&self.surface).await
        }
    }
}
