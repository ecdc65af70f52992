use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::Settings;
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of an optional UI interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Performed,
    NotAvailable,
}

impl ActionOutcome {
    pub fn performed(self) -> bool {
        self == ActionOutcome::Performed
    }
}

/// One browser tab the scraper drives.
///
/// A missing element is reported as `ActionOutcome::NotAvailable`; any other browser
/// failure is an error.
#[async_trait]
pub trait PageRenderer: Send {
    /// Navigates to `url` and waits for the page load.
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Polls until an element matching `selector` exists or `timeout` runs out.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()>;
    /// Clicks the first element matching `selector`, if the page renders one.
    async fn try_click(&mut self, selector: &str) -> Result<ActionOutcome>;
    /// Returns the current DOM serialized as HTML.
    async fn html(&mut self) -> Result<String>;
    /// Shuts the browser down.
    async fn close(&mut self) -> Result<()>;
}

/// Headless Chromium driven over the devtools protocol.
///
/// The browser process is started by the first call that needs a page, so runs that only
/// fetch over HTTP never launch it.
pub struct ChromiumRenderer {
    settings: Settings,
    tab: Option<ChromiumTab>,
}

impl ChromiumRenderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
            tab: None,
        }
    }

    pub fn is_launched(&self) -> bool {
        self.tab.is_some()
    }

    async fn tab(&mut self) -> Result<&mut ChromiumTab> {
        let tab = match self.tab.take() {
            Some(tab) => tab,
            None => ChromiumTab::launch(&self.settings).await?,
        };
        Ok(self.tab.insert(tab))
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab().await?.navigate(url).await
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab().await?.wait_for(selector, timeout).await
    }

    async fn try_click(&mut self, selector: &str) -> Result<ActionOutcome> {
        self.tab().await?.try_click(selector).await
    }

    async fn html(&mut self) -> Result<String> {
        self.tab().await?.html().await
    }

    async fn close(&mut self) -> Result<()> {
        match self.tab.take() {
            Some(mut tab) => tab.close().await,
            None => {
                debug!("browser was never launched");
                Ok(())
            }
        }
    }
}

struct ChromiumTab {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    settle: Duration,
    nav_timeout: Duration,
}

impl ChromiumTab {
    async fn launch(settings: &Settings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1366, 768)
            .arg("--disable-notifications")
            .arg(format!("--accept-lang={}", settings.accept_language));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|reason| Error::InvalidSetting {
                key: "browser",
                reason,
            })?;

        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    trace!("browser handler event error: {e}");
                }
            }
        });
        let page = browser.new_page("about:blank").await?;
        debug!("launched browser, headless: {}", settings.headless);

        Ok(Self {
            browser,
            page,
            handler,
            settle: settings.settle(),
            nav_timeout: settings.max_wait(),
        })
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        trace!("navigating to {url}");
        let nav = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, Error>(())
        };
        tokio::time::timeout(self.nav_timeout, nav)
            .await
            .map_err(|_| Error::WaitTimeout {
                selector: format!("navigation to {url}"),
                timeout: self.nav_timeout,
            })?
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if !self.page.find_elements(selector).await?.is_empty() {
                trace!("{selector} appeared after {:?}", start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(Error::WaitTimeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn try_click(&mut self, selector: &str) -> Result<ActionOutcome> {
        let Some(element) = self.page.find_elements(selector).await?.into_iter().next() else {
            return Ok(ActionOutcome::NotAvailable);
        };
        element.click().await?;
        // Content behind the control is loaded by scripts after the click.
        tokio::time::sleep(self.settle).await;
        Ok(ActionOutcome::Performed)
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("browser process didn't exit cleanly: {e}");
        }
        self.handler.abort();
        closed?;
        debug!("browser closed");
        Ok(())
    }
}

/// Requests a page and returns a `Result<String>` containing the HTML.
///
/// Place pages are server rendered, so they don't need the browser.
pub(crate) async fn request_page_html(client: &Client, url: &str) -> Result<String> {
    let res = client.get(url).send().await?.error_for_status()?;
    let html = res.text().await?;
    Ok(html)
}
