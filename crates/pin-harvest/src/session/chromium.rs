//! Chromium-backed browser session using chromiumoxide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{parse_cookie_string, BrowserSession};
use crate::config::DEFAULT_USER_AGENT;
use crate::types::{HarvestError, HarvestResult};

/// How to start the browser for a harvest run.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit Chromium binary; searched on `PATH` when unset.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Browser window size; the page viewport follows it.
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub proxy_url: Option<String>,
    /// Raw `Cookie` header value copied from a logged-in browser.
    pub cookie_string: Option<String>,
    /// URL the cookies are scoped to.
    pub cookie_url: String,
    pub no_sandbox: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_url: None,
            cookie_string: None,
            cookie_url: "https://www.pinterest.com".to_string(),
            no_sandbox: false,
        }
    }
}

/// Find a Chromium binary on the system `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    ["google-chrome", "chromium", "chromium-browser", "google-chrome-stable"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// One browser with one page, driven through [`BrowserSession`].
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    closed: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    /// Launch Chromium, apply cookies, and open a blank page.
    pub async fn launch(options: &LaunchOptions) -> HarvestResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(None::<Viewport>)
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--disable-dev-shm-usage");

        if !options.headless {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(proxy) = &options.proxy_url {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(path) = options.chrome_path.clone().or_else(find_chromium) {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| HarvestError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to launch Chromium: {e}")))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_closed = Arc::clone(&closed);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler error: {e}");
                }
            }
            handler_closed.store(true, Ordering::SeqCst);
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to create page: {e}")))?;

        let session = Self {
            browser,
            page,
            closed,
            handler_task,
        };

        if let Some(raw) = options.cookie_string.as_deref() {
            session.apply_cookies(raw, &options.cookie_url).await?;
        } else {
            tracing::warn!("No cookie string configured, browsing anonymously");
        }

        tracing::info!("Chromium session ready");
        Ok(session)
    }

    async fn apply_cookies(&self, raw: &str, cookie_url: &str) -> HarvestResult<()> {
        let cookies = parse_cookie_string(raw)
            .into_iter()
            .map(|pair| {
                CookieParam::builder()
                    .name(pair.name)
                    .value(pair.value)
                    .url(cookie_url)
                    .build()
                    .map_err(HarvestError::Browser)
            })
            .collect::<HarvestResult<Vec<_>>>()?;

        let count = cookies.len();
        self.page
            .set_cookies(cookies)
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to set cookies: {e}")))?;
        tracing::info!("Applied {count} cookies");
        Ok(())
    }

    /// Close the page and the browser process.
    pub async fn shutdown(mut self) -> HarvestResult<()> {
        if let Err(e) = self.page.close().await {
            tracing::debug!("page close failed: {e}");
        }
        self.browser
            .close()
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to close browser: {e}")))?;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("waiting for browser exit failed: {e}");
        }
        self.handler_task.abort();
        tracing::info!("Browser closed");
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> HarvestResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| HarvestError::NavigationFailure(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> HarvestResult<Vec<Element>> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| HarvestError::Browser(format!("query '{selector}' failed: {e}")))
    }

    async fn query_selector(
        &self,
        element: &Element,
        selector: &str,
    ) -> HarvestResult<Option<Element>> {
        let found = element
            .find_elements(selector)
            .await
            .map_err(|e| HarvestError::Browser(format!("inner query '{selector}' failed: {e}")))?;
        Ok(found.into_iter().next())
    }

    async fn get_attribute(&self, element: &Element, name: &str) -> HarvestResult<Option<String>> {
        element
            .attribute(name)
            .await
            .map_err(|e| HarvestError::Browser(format!("reading attribute '{name}' failed: {e}")))
    }

    async fn evaluate(&self, script: &str) -> HarvestResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| HarvestError::Browser(format!("script evaluation failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
