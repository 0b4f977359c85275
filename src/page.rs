use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page as CrPage;
use chromiumoxide::page::ScreenshotParams;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dom::{Document, DomEvent, DomNode, DomTree, EffectMode, NodeId};
use crate::error::{Error, Result};
use crate::instrument::{
    node_expr, ENTER_DISCOVERY_JS, EXIT_DISCOVERY_JS, MUTATION_COUNT_JS, TREE_JS,
};

/// How often the page-side mutation counter is read.
const MUTATION_POLL: Duration = Duration::from_millis(100);

/// A browser tab under automation. Implements [`Document`].
pub struct Page {
    inner: CrPage,
    default_timeout: Duration,
    mutations: watch::Receiver<u64>,
    mutation_task: JoinHandle<()>,
}

impl Page {
    pub(crate) fn new(inner: CrPage, default_timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(0);
        let poller = inner.clone();
        let task = tokio::spawn(async move {
            let mut last: Option<i64> = None;
            let mut tick = tokio::time::interval(MUTATION_POLL);
            while !tx.is_closed() {
                tick.tick().await;
                // Evaluation fails mid-navigation; the next tick catches up.
                let Ok(result) = poller.evaluate(MUTATION_COUNT_JS).await else {
                    continue;
                };
                let Ok(count) = result.into_value::<i64>() else {
                    continue;
                };
                if last.is_some_and(|seen| seen != count) {
                    tx.send_modify(|n| *n += 1);
                }
                last = Some(count);
            }
        });
        Self {
            inner,
            default_timeout,
            mutations: rx,
            mutation_task: task,
        }
    }

    /// Returns a reference to the underlying chromiumoxide Page.
    pub fn inner(&self) -> &CrPage {
        &self.inner
    }

    /// Navigate to the given URL and wait for the page to load.
    pub async fn goto(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.default_timeout, self.inner.goto(url))
            .await
            .map_err(|_| Error::NavigationError(format!("Timed out loading {url}")))?
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        Ok(())
    }

    /// Take a screenshot of the visible viewport (PNG format).
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| Error::ScreenshotError(e.to_string()))
    }

    /// Take a screenshot and save it to a file.
    pub async fn screenshot_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.inner
            .save_screenshot(params, path)
            .await
            .map_err(|e| Error::ScreenshotError(e.to_string()))?;
        Ok(())
    }

    /// Evaluate a JavaScript expression without caring about the return value.
    pub async fn evaluate_void(&self, expression: &str) -> Result<()> {
        self.inner
            .evaluate(expression)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }

    async fn on_node(&self, node: NodeId, body: &str) -> Result<()> {
        let js = format!("(() => {{ const el = {}; {body} }})()", node_expr(node.0));
        self.evaluate_void(&js).await
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.mutation_task.abort();
    }
}

#[async_trait]
impl Document for Page {
    async fn tree(&self) -> Result<DomTree> {
        let result = self
            .inner
            .evaluate(TREE_JS)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        let json: String = result
            .into_value()
            .map_err(|e| Error::JsError(e.to_string()))?;
        let nodes: Vec<DomNode> = serde_json::from_str(&json)?;
        Ok(DomTree::from_nodes(nodes))
    }

    async fn url(&self) -> Result<String> {
        self.inner
            .url()
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?
            .ok_or_else(|| Error::NavigationError("No URL found".into()))
    }

    async fn title(&self) -> Result<String> {
        let result = self
            .inner
            .evaluate("document.title")
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(result.into_value::<String>().unwrap_or_default())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        let value_js = serde_json::to_string(value)?;
        self.on_node(node, &format!("el.focus(); el.value = {value_js};"))
            .await
    }

    async fn set_checked(&self, node: NodeId, checked: bool) -> Result<()> {
        self.on_node(node, &format!("el.checked = {checked};")).await
    }

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<()> {
        let name = event.name();
        self.on_node(
            node,
            &format!("el.dispatchEvent(new Event('{name}', {{ bubbles: true }}));"),
        )
        .await
    }

    async fn click(&self, node: NodeId) -> Result<()> {
        self.on_node(node, "el.click();").await
    }

    async fn submit(&self, form: NodeId) -> Result<()> {
        self.on_node(form, "HTMLFormElement.prototype.submit.call(el);")
            .await
    }

    async fn set_effect_mode(&self, mode: EffectMode) -> Result<()> {
        let js = match mode {
            EffectMode::Live => EXIT_DISCOVERY_JS,
            EffectMode::Discovery => ENTER_DISCOVERY_JS,
        };
        self.evaluate_void(js).await
    }

    fn release_discovery(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime left to restore live mode");
            return;
        };
        let page = self.inner.clone();
        runtime.spawn(async move {
            if let Err(e) = page.evaluate(EXIT_DISCOVERY_JS).await {
                tracing::warn!(error = %e, "failed to restore live mode");
            }
        });
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.mutations.clone()
    }
}
