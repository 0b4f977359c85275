use std::time::Duration;

use crate::browser::FlowBrowser;
use crate::error::Result;

pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// Timeout for page loads (default: 30s).
    pub default_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            chrome_path: None,
            default_timeout: Duration::from_secs(30),
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Set the timeout for page loads.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn build_config(self) -> BrowserConfig {
        self.config
    }

    pub async fn build(self) -> Result<FlowBrowser> {
        FlowBrowser::launch(self.build_config()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tuning for flow discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on recorded steps (default: 10).
    pub max_steps: usize,
    /// Wait after activating an advance control before re-reading (default: 900ms).
    pub settle_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            settle_delay: Duration::from_millis(900),
        }
    }
}

impl ScanConfig {
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Tuning for bulk replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Pause between rows (default: 1s).
    pub row_delay: Duration,
    /// Upper bound on waiting for the next step (default: 9s).
    pub step_timeout: Duration,
    /// How often the location is polled while waiting (default: 250ms).
    pub poll_interval: Duration,
    /// Emit a screenshot request after each completed row.
    pub screenshot_each_row: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            row_delay: Duration::from_secs(1),
            step_timeout: Duration::from_secs(9),
            poll_interval: Duration::from_millis(250),
            screenshot_each_row: false,
        }
    }
}

impl ReplayConfig {
    pub fn row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = delay;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn screenshot_each_row(mut self, enabled: bool) -> Self {
        self.screenshot_each_row = enabled;
        self
    }
}
