use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;

use crate::config::{BrowserBuilder, BrowserConfig};
use crate::error::{Error, Result};
use crate::instrument;
use crate::page::Page;

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "disable-client-side-phishing-detection",
    "disable-popup-blocking",
    "disable-prompt-on-repost",
];

/// A launched Chrome instance whose pages can be scanned and replayed.
pub struct FlowBrowser {
    browser: CrBrowser,
    default_timeout: std::time::Duration,
    _handler_task: tokio::task::JoinHandle<()>,
}

impl FlowBrowser {
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Launch a browser instance with the given configuration.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let mut builder = CrBrowserConfig::builder();

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        // chromiumoxide adds the `--` prefix itself
        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder.viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        });

        let cr_config = builder
            .build()
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let (browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        tracing::info!(headless = config.headless, "browser launched");
        Ok(Self {
            browser,
            default_timeout: config.default_timeout,
            _handler_task: handler_task,
        })
    }

    /// Open a new tab at `url`. The page is instrumented before navigation so
    /// discovery mode and mutation tracking cover the first document.
    pub async fn open(&self, url: &str) -> Result<Page> {
        let cr_page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;

        instrument::apply_instrumentation(&cr_page).await?;

        let page = Page::new(cr_page, self.default_timeout);
        page.goto(url).await?;
        tracing::debug!(url, "page opened");
        Ok(page)
    }

    /// Return all currently open pages (tabs). Pages not opened through
    /// [`FlowBrowser::open`] are instrumented on the way out.
    pub async fn pages(&self) -> Result<Vec<Page>> {
        let timeout = self.default_timeout;
        let cr_pages = self.browser.pages().await.map_err(Error::CdpError)?;
        let mut pages = Vec::with_capacity(cr_pages.len());
        for cr_page in cr_pages {
            instrument::apply_instrumentation(&cr_page).await?;
            pages.push(Page::new(cr_page, timeout));
        }
        Ok(pages)
    }
}
