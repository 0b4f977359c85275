//! Scripted in-process document for tests and dry runs.
//!
//! A [`MemoryDocument`] holds a set of pages built from [`Element`] trees.
//! Controls carry [`Behavior`]s that swap the visible page, navigate, or issue
//! network requests, and everything the automation does is recorded in a
//! [`Journal`]. Discovery mode behaves like the instrumented browser: requests
//! never settle and native submissions are dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::dom::{Document, DomEvent, DomNode, DomTree, EffectMode, NodeId};
use crate::error::Result;
use crate::selector;

/// Builder for a static element tree.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    rendered: bool,
    children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            text: String::new(),
            rendered: true,
            children: Vec::new(),
        }
    }

    /// `<input name=…>`
    pub fn input(name: &str) -> Self {
        Self::new("input").attr("name", name)
    }

    /// `<button>` without a type attribute.
    pub fn button(text: &str) -> Self {
        Self::new("button").text(text)
    }

    /// `<select name=…>` with `(value, text)` options.
    pub fn select(name: &str, options: &[(&str, &str)]) -> Self {
        Self::new("select").attr("name", name).children(
            options
                .iter()
                .map(|(value, text)| Self::new("option").attr("value", *value).text(*text)),
        )
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.retain(|(k, _)| k != name);
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// No layout box, as with `display: none`. Applies to descendants too.
    pub fn hidden(mut self) -> Self {
        self.rendered = false;
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn into_tree(self) -> DomTree {
        let mut nodes = Vec::new();
        self.flatten(None, true, &mut nodes);
        DomTree::from_nodes(nodes)
    }

    fn flatten(self, parent: Option<NodeId>, parent_rendered: bool, out: &mut Vec<DomNode>) {
        let attrs: BTreeMap<String, String> = self.attrs.into_iter().collect();
        let value = match attrs.get("value") {
            Some(v) => v.clone(),
            None if self.tag == "option" => self.text.trim().to_string(),
            None => String::new(),
        };
        let rendered = parent_rendered && self.rendered;
        let id = NodeId(out.len());
        out.push(DomNode {
            checked: attrs.contains_key("checked"),
            tag: self.tag,
            attrs,
            text: self.text,
            rendered,
            value,
            parent,
            children: Vec::new(),
        });
        for child in self.children {
            child.flatten(Some(id), rendered, out);
        }
        if out[id.0].tag == "select" {
            let options: Vec<&DomNode> = out[id.0 + 1..]
                .iter()
                .filter(|n| n.tag == "option")
                .collect();
            let selected = options
                .iter()
                .find(|n| n.attrs.contains_key("selected"))
                .or(options.first())
                .map(|n| n.value.clone());
            if let Some(v) = selected {
                out[id.0].value = v;
            }
        }
    }
}

/// What happens when a control is clicked or a form is submitted.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Re-render in place with another page's content; the URL stays.
    Show(usize),
    /// Load another page; the URL changes.
    Navigate(usize),
    /// Issue a network request. In discovery mode it never settles and the
    /// remaining behaviors of the same trigger never run.
    Fetch(String),
    Delayed(Duration, Box<Behavior>),
}

/// One page of a [`MemoryDocument`].
#[derive(Debug, Clone)]
pub struct MemoryPage {
    url: String,
    title: String,
    tree: DomTree,
    clicks: Vec<(String, Vec<Behavior>)>,
    on_submit: Vec<Behavior>,
}

impl MemoryPage {
    /// `body` becomes the only child of an `<html>` root.
    pub fn new(url: &str, title: &str, body: Element) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            tree: Element::new("html").child(body).into_tree(),
            clicks: Vec::new(),
            on_submit: Vec::new(),
        }
    }

    pub fn on_click(mut self, selector: &str, behaviors: Vec<Behavior>) -> Self {
        self.clicks.push((selector.to_string(), behaviors));
        self
    }

    /// Runs after a native submission of any form on the page.
    pub fn on_submit(mut self, behaviors: Vec<Behavior>) -> Self {
        self.on_submit = behaviors;
        self
    }
}

/// A native form submission that actually went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub url: String,
    pub values: BTreeMap<String, String>,
}

/// Everything the automation did to the document.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub clicks: Vec<String>,
    pub writes: Vec<(String, String)>,
    pub events: Vec<(String, DomEvent)>,
    pub submissions: Vec<Submission>,
    pub blocked_submissions: usize,
    pub completed_requests: Vec<String>,
    pub suppressed_requests: Vec<String>,
    pub mode_changes: Vec<EffectMode>,
}

struct State {
    pages: Vec<MemoryPage>,
    current: usize,
    url: String,
    tree: DomTree,
    mode: EffectMode,
    journal: Journal,
}

struct Inner {
    state: Mutex<State>,
    mutations: watch::Sender<u64>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self, state: &mut State, page: usize, keep_url: bool) {
        let Some(next) = state.pages.get(page) else {
            tracing::warn!(page, "memory document has no such page");
            return;
        };
        state.tree = next.tree.clone();
        if !keep_url {
            state.url = next.url.clone();
        }
        state.current = page;
        self.mutations.send_modify(|n| *n += 1);
    }

    fn run(self: &Arc<Self>, state: &mut State, behaviors: &[Behavior]) {
        for behavior in behaviors {
            match behavior {
                Behavior::Show(page) => self.load(state, *page, true),
                Behavior::Navigate(page) => self.load(state, *page, false),
                Behavior::Fetch(url) => {
                    if state.mode == EffectMode::Discovery {
                        state.journal.suppressed_requests.push(url.clone());
                        return;
                    }
                    state.journal.completed_requests.push(url.clone());
                }
                Behavior::Delayed(delay, inner) => {
                    let this = Arc::clone(self);
                    let delay = *delay;
                    let inner = (**inner).clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let mut state = this.lock();
                        this.run(&mut state, std::slice::from_ref(&inner));
                    });
                }
            }
        }
    }

    fn submit(self: &Arc<Self>, state: &mut State, form: NodeId) {
        if state.mode == EffectMode::Discovery {
            state.journal.blocked_submissions += 1;
            return;
        }
        let tree = &state.tree;
        let mut values = BTreeMap::new();
        for id in tree.descendants(form) {
            let Some(node) = tree.node(id) else { continue };
            let Some(name) = node.attr("name") else { continue };
            if !matches!(node.tag.as_str(), "input" | "select" | "textarea") {
                continue;
            }
            match node.input_type().as_str() {
                "checkbox" | "radio" if !node.checked => {}
                "checkbox" | "radio" => {
                    let v = node.attr("value").unwrap_or("on");
                    values.insert(name.to_string(), v.to_string());
                }
                "submit" | "button" | "image" => {}
                _ => {
                    values.insert(name.to_string(), node.value.clone());
                }
            }
        }
        state.journal.submissions.push(Submission {
            url: state.url.clone(),
            values,
        });
        let behaviors = state.pages[state.current].on_submit.clone();
        self.run(state, &behaviors);
    }
}

/// In-process [`Document`] over scripted pages. Clones share state.
#[derive(Clone)]
pub struct MemoryDocument {
    inner: Arc<Inner>,
    mutations: watch::Receiver<u64>,
}

impl MemoryDocument {
    /// Start on the first page. An empty page list yields an empty document.
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        let (tx, rx) = watch::channel(0);
        let (url, tree) = pages
            .first()
            .map(|p| (p.url.clone(), p.tree.clone()))
            .unwrap_or_default();
        let state = State {
            pages,
            current: 0,
            url,
            tree,
            mode: EffectMode::Live,
            journal: Journal::default(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                mutations: tx,
            }),
            mutations: rx,
        }
    }

    pub fn journal(&self) -> Journal {
        self.inner.lock().journal.clone()
    }

    pub fn current_page(&self) -> usize {
        self.inner.lock().current
    }

    pub fn effect_mode(&self) -> EffectMode {
        self.inner.lock().mode
    }

    /// Jump to a page as if the user navigated there.
    pub fn goto(&self, page: usize) {
        let mut state = self.inner.lock();
        self.inner.load(&mut state, page, false);
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        let state = self.inner.lock();
        let id = selector::resolve(&state.tree, selector)?;
        state.tree.node(id).map(|n| n.value.clone())
    }

    pub fn is_checked(&self, selector: &str) -> Option<bool> {
        let state = self.inner.lock();
        let id = selector::resolve(&state.tree, selector)?;
        state.tree.node(id).map(|n| n.checked)
    }
}

#[async_trait]
impl Document for MemoryDocument {
    async fn tree(&self) -> Result<DomTree> {
        Ok(self.inner.lock().tree.clone())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.inner.lock().url.clone())
    }

    async fn title(&self) -> Result<String> {
        let state = self.inner.lock();
        Ok(state.pages.get(state.current).map(|p| p.title.clone()).unwrap_or_default())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        let mut state = self.inner.lock();
        let selector = selector::synthesize(&state.tree, node);
        let accepted = if state.tree.tag(node) == "select" {
            let has_option = state.tree.descendants(node).into_iter().any(|o| {
                state.tree.node(o).is_some_and(|n| n.tag == "option" && n.value == value)
            });
            if has_option { value } else { "" }
        } else {
            value
        };
        let accepted = accepted.to_string();
        if let Some(el) = state.tree.node_mut(node) {
            el.value = accepted.clone();
        }
        state.journal.writes.push((selector, accepted));
        Ok(())
    }

    async fn set_checked(&self, node: NodeId, checked: bool) -> Result<()> {
        let mut state = self.inner.lock();
        let is_radio = state.tree.node(node).is_some_and(|n| n.input_type() == "radio");
        if checked && is_radio {
            let name = state.tree.attr(node, "name").map(str::to_string);
            let group = state.tree.find_all(|n| {
                n.input_type() == "radio" && n.attr("name").map(str::to_string) == name
            });
            for other in group {
                if let Some(el) = state.tree.node_mut(other) {
                    el.checked = false;
                }
            }
        }
        let selector = selector::synthesize(&state.tree, node);
        if let Some(el) = state.tree.node_mut(node) {
            el.checked = checked;
        }
        state.journal.writes.push((selector, checked.to_string()));
        Ok(())
    }

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<()> {
        let mut state = self.inner.lock();
        let selector = selector::synthesize(&state.tree, node);
        state.journal.events.push((selector, event));
        Ok(())
    }

    async fn click(&self, node: NodeId) -> Result<()> {
        let mut state = self.inner.lock();
        let selector = selector::synthesize(&state.tree, node);
        state.journal.clicks.push(selector);

        let page_before = state.current;
        let mutations_before = *self.inner.mutations.borrow();
        let behaviors: Vec<Behavior> = state.pages[state.current]
            .clicks
            .iter()
            .filter(|(sel, _)| selector::resolve(&state.tree, sel) == Some(node))
            .flat_map(|(_, b)| b.iter().cloned())
            .collect();
        self.inner.run(&mut state, &behaviors);

        let rerendered =
            state.current != page_before || *self.inner.mutations.borrow() != mutations_before;
        if rerendered {
            return Ok(());
        }
        let submits = state.tree.node(node).is_some_and(|n| match n.tag.as_str() {
            "button" => n.input_type() == "submit",
            "input" => matches!(n.input_type().as_str(), "submit" | "image"),
            _ => false,
        });
        if submits {
            let form = state
                .tree
                .forms()
                .into_iter()
                .find(|f| state.tree.is_ancestor(*f, node));
            if let Some(form) = form {
                self.inner.submit(&mut state, form);
            }
        }
        Ok(())
    }

    async fn submit(&self, form: NodeId) -> Result<()> {
        let mut state = self.inner.lock();
        self.inner.submit(&mut state, form);
        Ok(())
    }

    async fn set_effect_mode(&self, mode: EffectMode) -> Result<()> {
        let mut state = self.inner.lock();
        state.mode = mode;
        state.journal.mode_changes.push(mode);
        Ok(())
    }

    fn release_discovery(&self) {
        let mut state = self.inner.lock();
        state.mode = EffectMode::Live;
        state.journal.mode_changes.push(EffectMode::Live);
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.mutations.clone()
    }
}
