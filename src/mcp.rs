use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use eoka_extract::{BrowserAgent, Config, EokaSurface};

type Agent = BrowserAgent<EokaSurface>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NavigateRequest {
    #[schemars(description = "URL to navigate to")]
    pub url: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteScriptRequest {
    #[schemars(
        description = "JavaScript function expression, e.g. \"(selector) => document.querySelector(selector).innerText\". May be async."
    )]
    pub function: String,
    #[schemars(description = "JSON arguments passed to the function in order")]
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SwitchTabRequest {
    #[schemars(description = "Tab id from list_tabs")]
    pub tab_id: u32,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

fn json_ok(value: &impl serde::Serialize) -> Result<CallToolResult, ErrorData> {
    text_ok(serde_json::to_string_pretty(value).map_err(err)?)
}

fn no_page() -> ErrorData {
    ErrorData::internal_error("No page open. Use navigate first.", None::<Value>)
}

#[derive(Clone)]
pub struct ReaderServer {
    config: Arc<Config>,
    agent: Arc<Mutex<Option<Agent>>>,
    tool_router: ToolRouter<Self>,
}

impl ReaderServer {
    async fn ensure_agent(&self) -> Result<(), ErrorData> {
        let mut guard = self.agent.lock().await;
        if guard.is_none() {
            let surface = EokaSurface::launch(&self.config.browser)
                .await
                .map_err(err)?;
            *guard = Some(BrowserAgent::new(surface, &self.config.extraction));
        }
        Ok(())
    }
}

#[tool_router]
impl ReaderServer {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            agent: Arc::new(Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Navigate to a URL. Launches browser on first call.")]
    async fn navigate(
        &self,
        req: Parameters<NavigateRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.ensure_agent().await?;
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        let page = agent.navigate_to(&req.0.url).await.map_err(err)?;
        text_ok(format!("Navigated to: {}\nTitle: {}", page.url, page.title))
    }

    #[tool(description = "Take a screenshot of the viewport. Returns a base64 PNG image.")]
    async fn screenshot(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        let shot = agent.screenshot().await.map_err(err)?;
        // MCP wants bare base64, not a data URL.
        let data = match shot.image_base64.split_once(',') {
            Some((_, b64)) => b64.to_string(),
            None => shot.image_base64.clone(),
        };
        Ok(CallToolResult::success(vec![Content::image(
            data,
            shot.image_type,
        )]))
    }

    #[tool(
        description = "Run a JavaScript function in the page with JSON arguments and return its result as JSON. Thrown errors are reported as tool errors."
    )]
    async fn execute_script(
        &self,
        req: Parameters<ExecuteScriptRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        let req = req.0;
        let value = agent
            .execute_script(&req.function, req.args)
            .await
            .map_err(err)?;
        json_ok(&value)
    }

    #[tool(description = "List open tabs. There is always exactly one.")]
    async fn list_tabs(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        json_ok(&agent.list_tabs().await.map_err(err)?)
    }

    #[tool(description = "Switch to a tab by id. Only one tab exists, so this returns it.")]
    async fn switch_tab(
        &self,
        req: Parameters<SwitchTabRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        json_ok(&agent.switch_tab(req.0.tab_id).await.map_err(err)?)
    }

    #[tool(description = "Go back in browser history if there is a previous page.")]
    async fn go_back(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        if agent.go_back().await.map_err(err)? {
            text_ok("Navigated back.")
        } else {
            text_ok("No previous page in history.")
        }
    }

    #[tool(
        description = "Extract the text of the current page. PDFs (direct, embedded or in a viewer) are read page by page with pdf.js; other pages return their visible text."
    )]
    async fn extract_page_content(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.agent.lock().await;
        let agent = guard.as_ref().ok_or_else(no_page)?;
        let record = agent.extract_page_content().await;
        let header = format!(
            "Title: {}\nURL: {}\nType: {}\n\n",
            record.title, record.source_url, record.content_kind
        );
        let text = format!("{}{}", header, record.body);
        if record.is_error {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        } else {
            text_ok(text)
        }
    }

    #[tool(description = "Close the browser and release resources.")]
    async fn close(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.agent.lock().await;
        if let Some(agent) = guard.take() {
            agent.into_surface().close().await.map_err(err)?;
        }
        text_ok("Browser closed.")
    }
}

#[tool_handler]
impl ServerHandler for ReaderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "eoka-reader".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Page reading server. Use 'navigate' to open a URL (launches browser automatically), \
                 then 'extract_page_content' to read it; PDFs are detected and read page by page. \
                 'execute_script' runs a JS function with JSON arguments, 'screenshot' captures the viewport."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    info!("Starting MCP server on stdio");
    let server = ReaderServer::new(config);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
