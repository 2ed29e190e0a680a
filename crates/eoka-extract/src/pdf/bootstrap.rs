//! Loading pdf.js into the page.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bridge::RemoteFn;
use crate::config::LibraryConfig;
use crate::surface::Surface;
use crate::{Error, Result};

/// Host-side record of where pdf.js was last confirmed loaded.
///
/// Holds the page location at bootstrap time. Navigating away (or reloading
/// into a different URL) discards page globals, so a location mismatch means
/// the flag no longer holds. Shared through `Arc` for the lifetime of the
/// surface; never torn down explicitly.
#[derive(Debug, Default)]
pub struct BootstrapState {
    loaded_at: Mutex<Option<String>>,
}

impl BootstrapState {
    /// Nothing loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a page that already has the library.
    pub fn loaded_at(location: impl Into<String>) -> Self {
        Self {
            loaded_at: Mutex::new(Some(location.into())),
        }
    }

    pub async fn is_loaded_at(&self, location: &str) -> bool {
        self.loaded_at.lock().await.as_deref() == Some(location)
    }

    pub async fn mark_loaded(&self, location: &str) {
        *self.loaded_at.lock().await = Some(location.to_string());
    }

    /// Forget the flag, e.g. after the page turned out to have reloaded.
    pub async fn clear(&self) {
        *self.loaded_at.lock().await = None;
    }
}

/// How [`Bootstrapper::ensure`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// Host state already covered this page; nothing was sent.
    Cached,
    /// The page already had the library.
    Present,
    /// The library script was injected and configured.
    Injected,
}

static ENSURE_LIBRARY: RemoteFn = RemoteFn::new(
    "ensure_pdfjs",
    r#"async (scriptUrl, workerUrl) => {
  if (window.pdfjsLib) {
    return 'present';
  }
  const script = document.createElement('script');
  script.src = scriptUrl;
  script.crossOrigin = 'anonymous';
  await new Promise((resolve, reject) => {
    script.onload = () => resolve(true);
    script.onerror = () => reject(new Error('could not load ' + scriptUrl));
    (document.head || document.documentElement).appendChild(script);
  });
  if (!window.pdfjsLib) {
    throw new Error(scriptUrl + ' loaded but did not define pdfjsLib');
  }
  window.pdfjsLib.GlobalWorkerOptions.workerSrc = workerUrl;
  return 'injected';
}"#,
);

/// Makes sure pdf.js is available in the page before extraction runs.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    library: LibraryConfig,
    state: Arc<BootstrapState>,
}

impl Bootstrapper {
    pub fn new(library: LibraryConfig, state: Arc<BootstrapState>) -> Self {
        Self { library, state }
    }

    pub fn state(&self) -> &Arc<BootstrapState> {
        &self.state
    }

    pub fn library(&self) -> &LibraryConfig {
        &self.library
    }

    /// Load the library if it is not already there. Idempotent.
    ///
    /// A script load error fails with [`Error::LibraryBootstrap`] and leaves
    /// the state untouched, so a half-initialized library is never used.
    pub async fn ensure(&self, surface: &dyn Surface) -> Result<BootstrapOutcome> {
        let location = surface.current_location().await?;
        if self.state.is_loaded_at(&location).await {
            debug!("pdf.js already loaded for {}", location);
            return Ok(BootstrapOutcome::Cached);
        }

        let outcome: BootstrapOutcome = ENSURE_LIBRARY
            .call()
            .arg(&self.library.script_url())?
            .arg(&self.library.worker_url())?
            .execute(surface)
            .await
            .map_err(|e| match e {
                Error::RemoteExecution(msg) => Error::LibraryBootstrap(msg),
                other => other,
            })?;

        if outcome == BootstrapOutcome::Injected {
            info!("pdf.js {} loaded into {}", self.library.version, location);
        }
        self.state.mark_loaded(&location).await;
        Ok(outcome)
    }
}
