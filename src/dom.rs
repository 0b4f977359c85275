//! Read-only view of a live document plus the trait every backend implements.
//!
//! Elements are addressed by [`NodeId`], their index in document order. A
//! `NodeId` is only meaningful against the tree it came from; callers re-read
//! the tree after anything that may have re-rendered the page.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;

/// Index of an element in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// One element as seen when the tree was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Text of the element's own text-node children.
    #[serde(default)]
    pub text: String,
    /// Whether the element has a layout box.
    #[serde(default)]
    pub rendered: bool,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(skip)]
    pub children: Vec<NodeId>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// The `type` property as the DOM reports it.
    pub fn input_type(&self) -> String {
        match self.tag.as_str() {
            "input" => self
                .attr("type")
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "text".into()),
            "select" if self.attrs.contains_key("multiple") => "select-multiple".into(),
            "select" => "select-one".into(),
            "textarea" => "textarea".into(),
            "button" => self
                .attr("type")
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "submit".into()),
            _ => String::new(),
        }
    }
}

/// Flat, document-ordered element tree. Index 0 is the root element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomTree {
    nodes: Vec<DomNode>,
}

impl DomTree {
    /// Build a tree from nodes listed in document order with parent links set.
    pub fn from_nodes(mut nodes: Vec<DomNode>) -> Self {
        for node in &mut nodes {
            node.children.clear();
            node.tag.make_ascii_lowercase();
        }
        for i in 0..nodes.len() {
            if let Some(parent) = nodes[i].parent {
                if let Some(p) = nodes.get_mut(parent.0) {
                    p.children.push(NodeId(i));
                }
            }
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut DomNode> {
        self.nodes.get_mut(id.0)
    }

    /// All node ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn tag(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.tag.as_str()).unwrap_or("")
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).and_then(|n| n.attr(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.parent(id) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Concatenated text of the element and its descendants, whitespace-collapsed.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        if let Some(n) = self.node(id) {
            parts.push(n.text.as_str());
        }
        for d in self.descendants(id) {
            if let Some(n) = self.node(d) {
                parts.push(n.text.as_str());
            }
        }
        parts
            .iter()
            .flat_map(|p| p.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 1-based position among same-tag siblings, and how many such siblings exist.
    pub fn same_tag_position(&self, id: NodeId) -> (usize, usize) {
        let tag = self.tag(id);
        let siblings: Vec<NodeId> = match self.parent(id) {
            Some(p) => self
                .children(p)
                .iter()
                .copied()
                .filter(|s| self.tag(*s) == tag)
                .collect(),
            None => vec![id],
        };
        let index = siblings.iter().position(|s| *s == id).unwrap_or(0) + 1;
        (index, siblings.len())
    }

    pub fn find(&self, pred: impl Fn(&DomNode) -> bool) -> Option<NodeId> {
        self.ids().find(|id| self.node(*id).is_some_and(&pred))
    }

    pub fn find_all(&self, pred: impl Fn(&DomNode) -> bool) -> Vec<NodeId> {
        self.ids().filter(|id| self.node(*id).is_some_and(&pred)).collect()
    }

    pub fn by_id(&self, dom_id: &str) -> Option<NodeId> {
        self.find(|n| n.attr("id") == Some(dom_id))
    }

    pub fn by_name(&self, name: &str) -> Option<NodeId> {
        self.find(|n| n.attr("name") == Some(name))
    }

    pub fn forms(&self) -> Vec<NodeId> {
        self.find_all(|n| n.tag == "form")
    }

    /// Text of the label associated with a control: `label[for=id]` first,
    /// then an enclosing `label`.
    pub fn label_for(&self, id: NodeId) -> Option<String> {
        let explicit = self.attr(id, "id").and_then(|dom_id| {
            self.find(|n| n.tag == "label" && n.attr("for") == Some(dom_id))
        });
        let label = explicit.or_else(|| {
            let mut cur = self.parent(id);
            while let Some(p) = cur {
                if self.tag(p) == "label" {
                    return Some(p);
                }
                cur = self.parent(p);
            }
            None
        })?;
        let text = self.text_content(label);
        (!text.is_empty()).then_some(text)
    }
}

/// Notification dispatched after writing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
    Input,
    Change,
}

impl DomEvent {
    pub fn name(self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
        }
    }
}

/// Whether network and submission primitives behave normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectMode {
    Live,
    /// Requests never settle and native submission is inert.
    Discovery,
}

/// Access to a live document under automation.
#[async_trait]
pub trait Document: Send + Sync {
    async fn tree(&self) -> Result<DomTree>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn set_value(&self, node: NodeId, value: &str) -> Result<()>;

    async fn set_checked(&self, node: NodeId, checked: bool) -> Result<()>;

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<()>;

    /// Synthetic activation, as `element.click()`.
    async fn click(&self, node: NodeId) -> Result<()>;

    /// Native submission of a form element.
    async fn submit(&self, form: NodeId) -> Result<()>;

    async fn set_effect_mode(&self, mode: EffectMode) -> Result<()>;

    /// Return to [`EffectMode::Live`] without awaiting the result. Used when a
    /// discovery scope is dropped before it could restore the mode itself.
    fn release_discovery(&self);

    /// Counter that advances on every structural change of the document.
    fn mutations(&self) -> watch::Receiver<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: &str, parent: Option<usize>, attrs: &[(&str, &str)], text: &str) -> DomNode {
        DomNode {
            tag: tag.into(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            text: text.into(),
            rendered: true,
            value: String::new(),
            checked: false,
            parent: parent.map(NodeId),
            children: Vec::new(),
        }
    }

    fn sample() -> DomTree {
        DomTree::from_nodes(vec![
            node("html", None, &[], ""),
            node("body", Some(0), &[], ""),
            node("form", Some(1), &[], ""),
            node("label", Some(2), &[("for", "mail")], "E-mail"),
            node("input", Some(2), &[("id", "mail")], ""),
            node("label", Some(2), &[], "Age "),
            node("input", Some(5), &[("type", "Number")], ""),
        ])
    }

    #[test]
    fn children_follow_parent_links() {
        let tree = sample();
        assert_eq!(tree.children(NodeId(2)), &[NodeId(3), NodeId(4), NodeId(5)]);
        assert_eq!(tree.descendants(NodeId(1)).len(), 5);
        assert!(tree.is_ancestor(NodeId(1), NodeId(6)));
    }

    #[test]
    fn labels_resolve_by_for_then_enclosing() {
        let tree = sample();
        assert_eq!(tree.label_for(NodeId(4)).as_deref(), Some("E-mail"));
        assert_eq!(tree.label_for(NodeId(6)).as_deref(), Some("Age"));
    }

    #[test]
    fn input_type_defaults_and_lowercases() {
        let tree = sample();
        assert_eq!(tree.node(NodeId(4)).unwrap().input_type(), "text");
        assert_eq!(tree.node(NodeId(6)).unwrap().input_type(), "number");
    }

    #[test]
    fn same_tag_position_counts_only_matching_tags() {
        let tree = sample();
        assert_eq!(tree.same_tag_position(NodeId(5)), (2, 2));
        assert_eq!(tree.same_tag_position(NodeId(4)), (1, 1));
    }
}
