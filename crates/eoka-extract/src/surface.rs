//! The browsing-surface capability the rest of the crate is written against.
//!
//! Everything above this module only needs [`Surface::current_location`],
//! [`Surface::current_title`] and [`Surface::run_script`]; the remaining calls
//! back the agent's one-shot tools.

use async_trait::async_trait;
use eoka::cdp::{PageGetNavigationHistory, PageGetNavigationHistoryResult};
use eoka::{Browser, Page, StealthConfig};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BrowserConfig;
use crate::Result;

/// A browsing surface (tab) as listed by [`Surface::list_open_surfaces`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceInfo {
    pub tab_id: u32,
    pub url: String,
    pub title: String,
}

/// One controlled browsing surface.
#[async_trait]
pub trait Surface: Send + Sync {
    /// PNG capture of the visible viewport.
    async fn capture_image(&self) -> Result<Vec<u8>>;

    async fn load_location(&self, url: &str) -> Result<()>;

    async fn current_location(&self) -> Result<String>;

    async fn current_title(&self) -> Result<String>;

    async fn can_go_back(&self) -> Result<bool>;

    async fn go_back(&self) -> Result<()>;

    async fn list_open_surfaces(&self) -> Result<Vec<SurfaceInfo>>;

    /// Evaluate `source` in the page's own world and await the value it
    /// produces. Promises are awaited before the value is returned.
    async fn run_script(&self, source: &str) -> Result<Value>;
}

/// [`Surface`] backed by a single eoka page.
pub struct EokaSurface {
    browser: Browser,
    page: Page,
}

impl EokaSurface {
    /// Launch a browser and open one blank tab to drive.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self { browser, page })
    }

    /// The underlying eoka page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser and release resources.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

#[async_trait]
impl Surface for EokaSurface {
    async fn capture_image(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn load_location(&self, url: &str) -> Result<()> {
        Ok(self.page.goto(url).await?)
    }

    async fn current_location(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.page.title().await?)
    }

    /// Same history index `Page::back` navigates from, so the two agree.
    async fn can_go_back(&self) -> Result<bool> {
        let history: PageGetNavigationHistoryResult = self
            .page
            .session()
            .send("Page.getNavigationHistory", &PageGetNavigationHistory {})
            .await?;
        Ok(history.current_index > 0)
    }

    async fn go_back(&self) -> Result<()> {
        Ok(self.page.back().await?)
    }

    async fn list_open_surfaces(&self) -> Result<Vec<SurfaceInfo>> {
        Ok(vec![SurfaceInfo {
            tab_id: 0,
            url: self.page.url().await?,
            title: self.page.title().await?,
        }])
    }

    async fn run_script(&self, source: &str) -> Result<Value> {
        Ok(self.page.evaluate(source).await?)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory [`Surface`] that answers bridge calls by function name.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Surface, SurfaceInfo};
    use crate::{Error, Result};

    type Handler = Box<dyn Fn(&[Value]) -> Reply + Send + Sync>;

    /// What a scripted function does when invoked.
    pub enum Reply {
        /// The remote function resolved with this value.
        Value(Value),
        /// The remote function threw with this message.
        Throw(String),
        /// The surface call itself failed (page destroyed, transport gone).
        Fail(String),
    }

    pub struct ScriptedSurface {
        location: Mutex<String>,
        title: String,
        detached: bool,
        history: Mutex<Vec<String>>,
        handlers: HashMap<&'static str, Handler>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl ScriptedSurface {
        pub fn new(location: &str) -> Self {
            Self {
                location: Mutex::new(location.to_string()),
                title: "Scripted".to_string(),
                detached: false,
                history: Mutex::new(Vec::new()),
                handlers: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn titled(mut self, title: &str) -> Self {
            self.title = title.to_string();
            self
        }

        /// Report no open surfaces, as after the tab was closed.
        pub fn detached(mut self) -> Self {
            self.detached = true;
            self
        }

        pub fn on(
            mut self,
            name: &'static str,
            handler: impl Fn(&[Value]) -> Reply + Send + Sync + 'static,
        ) -> Self {
            self.handlers.insert(name, Box::new(handler));
            self
        }

        pub fn set_location(&self, location: &str) {
            *self.location.lock().unwrap() = location.to_string();
        }

        /// Names of the remote functions invoked, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }

        pub fn calls_named(&self, name: &str) -> Vec<Vec<Value>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, args)| args.clone())
                .collect()
        }
    }

    /// Pull the function name and arguments back out of a composed snippet.
    fn parse_snippet(source: &str) -> (String, Vec<Value>) {
        let name = source
            .lines()
            .find_map(|l| l.trim().strip_prefix("// remote: "))
            .unwrap_or("<raw>")
            .to_string();
        let args = source
            .lines()
            .find_map(|l| l.trim().strip_prefix("const args = "))
            .and_then(|l| serde_json::from_str(l.trim_end_matches(';')).ok())
            .unwrap_or_default();
        (name, args)
    }

    #[async_trait]
    impl Surface for ScriptedSurface {
        async fn capture_image(&self) -> Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn load_location(&self, url: &str) -> Result<()> {
            let previous = std::mem::replace(&mut *self.location.lock().unwrap(), url.into());
            self.history.lock().unwrap().push(previous);
            Ok(())
        }

        async fn current_location(&self) -> Result<String> {
            Ok(self.location.lock().unwrap().clone())
        }

        async fn current_title(&self) -> Result<String> {
            Ok(self.title.clone())
        }

        async fn can_go_back(&self) -> Result<bool> {
            Ok(!self.history.lock().unwrap().is_empty())
        }

        async fn go_back(&self) -> Result<()> {
            if let Some(previous) = self.history.lock().unwrap().pop() {
                *self.location.lock().unwrap() = previous;
            }
            Ok(())
        }

        async fn list_open_surfaces(&self) -> Result<Vec<SurfaceInfo>> {
            if self.detached {
                return Ok(Vec::new());
            }
            Ok(vec![SurfaceInfo {
                tab_id: 0,
                url: self.location.lock().unwrap().clone(),
                title: self.title.clone(),
            }])
        }

        async fn run_script(&self, source: &str) -> Result<Value> {
            let (name, args) = parse_snippet(source);
            self.calls.lock().unwrap().push((name.clone(), args.clone()));
            let handler = self
                .handlers
                .get(name.as_str())
                .unwrap_or_else(|| panic!("no scripted reply for remote function {name}"));
            let envelope = match handler(&args) {
                Reply::Value(value) => json!({ "ok": true, "value": value }),
                Reply::Throw(message) => json!({ "ok": false, "error": message }),
                Reply::Fail(message) => return Err(Error::SurfaceUnavailable(message)),
            };
            Ok(Value::String(envelope.to_string()))
        }
    }
}
