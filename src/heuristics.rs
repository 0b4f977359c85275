//! Ranked, swappable guesses about an unknown document: which control moves
//! the flow forward, and which form is the one the user is looking at.

use crate::dom::{DomNode, DomTree, NodeId};

/// Decides whether an element looks like it advances to the next step.
pub trait AdvanceHeuristic: Send + Sync {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool;
}

/// Picks the form that represents the current step.
pub trait FormHeuristic: Send + Sync {
    fn pick(&self, tree: &DomTree) -> Option<NodeId>;
}

/// Words and glyphs that usually label a progression control.
pub const PROGRESSION_WORDS: &[&str] = &[
    "next", "continue", "proceed", "forward", "\u{203a}", "\u{00bb}", "step", "page",
];

/// Buttons, inputs and links whose text, value or accessible label contains
/// a progression word.
pub struct ProgressionVocabulary {
    words: Vec<String>,
}

impl ProgressionVocabulary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    fn is_control(node: &DomNode) -> bool {
        match node.tag.as_str() {
            "button" | "a" => true,
            "input" => matches!(node.input_type().as_str(), "button" | "submit" | "image"),
            _ => node.attr("role") == Some("button"),
        }
    }
}

impl Default for ProgressionVocabulary {
    fn default() -> Self {
        Self::new(PROGRESSION_WORDS)
    }
}

impl AdvanceHeuristic for ProgressionVocabulary {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(el) = tree.node(node) else {
            return false;
        };
        if !Self::is_control(el) {
            return false;
        }
        let mut haystacks = vec![tree.text_content(node)];
        if el.tag == "input" {
            haystacks.push(el.value.clone());
        }
        haystacks.extend(
            ["value", "aria-label", "title"]
                .iter()
                .filter_map(|a| el.attr(a).map(str::to_string)),
        );
        haystacks.iter().any(|text| {
            let text = text.to_lowercase();
            self.words.iter().any(|w| text.contains(w.as_str()))
        })
    }
}

/// First form that has a layout box.
pub struct FirstRendered;

impl FormHeuristic for FirstRendered {
    fn pick(&self, tree: &DomTree) -> Option<NodeId> {
        tree.find(|n| n.tag == "form" && n.rendered)
    }
}

/// First form in document order, rendered or not.
pub struct FirstInDocument;

impl FormHeuristic for FirstInDocument {
    fn pick(&self, tree: &DomTree) -> Option<NodeId> {
        tree.forms().into_iter().next()
    }
}

/// The ranked heuristic lists used by scanning and replay.
pub struct Heuristics {
    advance: Vec<Box<dyn AdvanceHeuristic>>,
    forms: Vec<Box<dyn FormHeuristic>>,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            advance: vec![Box::new(ProgressionVocabulary::default())],
            forms: vec![Box::new(FirstRendered), Box::new(FirstInDocument)],
        }
    }
}

impl Heuristics {
    pub fn empty() -> Self {
        Self {
            advance: Vec::new(),
            forms: Vec::new(),
        }
    }

    pub fn with_advance(mut self, heuristic: impl AdvanceHeuristic + 'static) -> Self {
        self.advance.push(Box::new(heuristic));
        self
    }

    pub fn with_form(mut self, heuristic: impl FormHeuristic + 'static) -> Self {
        self.forms.push(Box::new(heuristic));
        self
    }

    /// The form of the current step; first heuristic with an answer wins.
    pub fn current_form(&self, tree: &DomTree) -> Option<NodeId> {
        self.forms.iter().find_map(|h| h.pick(tree))
    }

    /// First advance-like control in document order. Earlier heuristics rank
    /// higher: a lower-ranked heuristic is only consulted when none before it
    /// matched anything.
    pub fn find_advance(&self, tree: &DomTree) -> Option<NodeId> {
        self.advance
            .iter()
            .find_map(|h| tree.ids().find(|id| h.matches(tree, *id)))
    }

    /// Like [`find_advance`](Self::find_advance), restricted to descendants of `scope`.
    pub fn find_advance_within(&self, tree: &DomTree, scope: NodeId) -> Option<NodeId> {
        let inside = tree.descendants(scope);
        self.advance
            .iter()
            .find_map(|h| inside.iter().copied().find(|id| h.matches(tree, *id)))
    }
}

/// Explicit submit-role control inside a form: `[type=submit]`, then a
/// `button` without a type. `type=button` controls never qualify.
pub fn submit_control(tree: &DomTree, form: NodeId) -> Option<NodeId> {
    let inside = tree.descendants(form);
    let find = |pred: &dyn Fn(&DomNode) -> bool| {
        inside
            .iter()
            .copied()
            .find(|id| tree.node(*id).is_some_and(|n| pred(n)))
    };
    find(&|n| {
        matches!(n.tag.as_str(), "input" | "button")
            && n.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("submit"))
    })
    .or_else(|| find(&|n| n.tag == "button" && n.attr("type").is_none()))
}
