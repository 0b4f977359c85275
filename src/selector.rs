//! Stable locators for form controls.
//!
//! Locators come in three shapes, most stable first: `[name="…"]`, `#id`, and a
//! structural path such as `form#signup > div:nth-of-type(2) > input`. The path
//! grammar is a subset of CSS, so the strings stay usable in a browser console.

use crate::dom::{DomTree, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Locator {
    Name(String),
    Id(String),
    Path(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    tag: String,
    id: Option<String>,
    nth: Option<usize>,
}

/// Produce a locator that re-resolves to `node` in the same document state.
pub fn synthesize(tree: &DomTree, node: NodeId) -> String {
    if let Some(name) = tree.attr(node, "name") {
        return format!("[name=\"{}\"]", escape(name));
    }
    if let Some(id) = tree.attr(node, "id") {
        return format!("#{id}");
    }

    let mut path = Vec::new();
    let mut cur = Some(node);
    while let Some(id) = cur {
        let tag = tree.tag(id);
        if tag.is_empty() || tag == "html" {
            break;
        }
        if let Some(dom_id) = tree.attr(id, "id") {
            path.push(format!("{tag}#{dom_id}"));
            break;
        }
        let (index, count) = tree.same_tag_position(id);
        if count > 1 {
            path.push(format!("{tag}:nth-of-type({index})"));
        } else {
            path.push(tag.to_string());
        }
        cur = tree.parent(id);
    }
    path.reverse();
    path.join(" > ")
}

/// Find the element a locator points at. Unparseable locators fall back to a
/// name lookup; anything unresolvable yields `None`.
pub fn resolve(tree: &DomTree, selector: &str) -> Option<NodeId> {
    match parse(selector) {
        Some(Locator::Name(name)) => tree.by_name(&name),
        Some(Locator::Id(id)) => tree.by_id(&id),
        Some(Locator::Path(segments)) => resolve_path(tree, &segments),
        None => legacy_name(selector).and_then(|name| tree.by_name(&name)),
    }
}

fn resolve_path(tree: &DomTree, segments: &[Segment]) -> Option<NodeId> {
    let (first, rest) = segments.split_first()?;
    let mut cur = match &first.id {
        Some(id) => tree.by_id(id).filter(|n| tree.tag(*n) == first.tag)?,
        None => {
            let root = tree.root()?;
            let top: Vec<NodeId> = if tree.tag(root) == "html" {
                tree.children(root).to_vec()
            } else {
                vec![root]
            };
            pick(tree, &top, first)?
        }
    };
    for segment in rest {
        let children = tree.children(cur).to_vec();
        cur = pick(tree, &children, segment)?;
    }
    Some(cur)
}

fn pick(tree: &DomTree, candidates: &[NodeId], segment: &Segment) -> Option<NodeId> {
    candidates
        .iter()
        .copied()
        .filter(|c| tree.tag(*c) == segment.tag)
        .filter(|c| match &segment.id {
            Some(id) => tree.attr(*c, "id") == Some(id.as_str()),
            None => true,
        })
        .nth(segment.nth.unwrap_or(1).checked_sub(1)?)
}

fn parse(selector: &str) -> Option<Locator> {
    let s = selector.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix("[name=").and_then(|r| r.strip_suffix(']')) {
        return unquote(inner).map(Locator::Name);
    }
    if let Some(id) = s.strip_prefix('#') {
        if !id.is_empty() && !id.contains(|c: char| c.is_whitespace() || c == '>') {
            return Some(Locator::Id(id.to_string()));
        }
        return None;
    }
    s.split('>')
        .map(|seg| parse_segment(seg.trim()))
        .collect::<Option<Vec<_>>>()
        .map(Locator::Path)
}

fn parse_segment(seg: &str) -> Option<Segment> {
    let (head, nth) = match seg.split_once(":nth-of-type(") {
        Some((head, tail)) => {
            let n: usize = tail.strip_suffix(')')?.trim().parse().ok()?;
            if n == 0 {
                return None;
            }
            (head, Some(n))
        }
        None => (seg, None),
    };
    let (tag, id) = match head.split_once('#') {
        Some((tag, id)) if !id.is_empty() => (tag, Some(id.to_string())),
        Some(_) => return None,
        None => (head, None),
    };
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(Segment {
        tag: tag.to_ascii_lowercase(),
        id,
        nth,
    })
}

fn unquote(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(body) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?),
                '"' => return None,
                c => out.push(c),
            }
        }
        return Some(out);
    }
    if let Some(body) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Some(body.to_string());
    }
    if !raw.is_empty() && !raw.contains(|c: char| c.is_whitespace() || "\"'[]".contains(c)) {
        return Some(raw.to_string());
    }
    None
}

/// Best-effort name extraction from older or hand-edited locators such as
/// `[name="a"b"]`, `input[name=q]` or `name=q`.
fn legacy_name(selector: &str) -> Option<String> {
    let (_, after) = selector.split_once("name=")?;
    let mut name = after.trim();
    name = name.strip_suffix(']').unwrap_or(name);
    for quote in ['"', '\''] {
        if let Some(inner) = name.strip_prefix(quote) {
            name = inner.strip_suffix(quote).unwrap_or(inner);
            break;
        }
    }
    (!name.is_empty()).then(|| name.to_string())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Element;

    fn tree() -> DomTree {
        Element::new("html")
            .child(
                Element::new("body")
                    .child(
                        Element::new("form")
                            .attr("id", "signup")
                            .child(Element::new("div").child(Element::new("input")))
                            .child(
                                Element::new("div")
                                    .child(Element::new("input"))
                                    .child(Element::new("input").attr("type", "email")),
                            ),
                    )
                    .child(Element::new("div").child(Element::new("textarea")))
                    .child(Element::input("first"))
                    .child(Element::new("select").attr("id", "country"))
                    .child(Element::input("say \"hi\"")),
            )
            .into_tree()
    }

    fn all_controls(tree: &DomTree) -> Vec<NodeId> {
        tree.find_all(|n| matches!(n.tag.as_str(), "input" | "textarea" | "select"))
    }

    #[test]
    fn prefers_name_then_id() {
        let tree = tree();
        let first = tree.by_name("first").unwrap();
        assert_eq!(synthesize(&tree, first), "[name=\"first\"]");
        let country = tree.by_id("country").unwrap();
        assert_eq!(synthesize(&tree, country), "#country");
    }

    #[test]
    fn structural_path_stops_at_id_ancestor() {
        let tree = tree();
        let controls = all_controls(&tree);
        assert_eq!(synthesize(&tree, controls[0]), "form#signup > div:nth-of-type(1) > input");
        assert_eq!(
            synthesize(&tree, controls[2]),
            "form#signup > div:nth-of-type(2) > input:nth-of-type(2)"
        );
        assert_eq!(synthesize(&tree, controls[3]), "body > div > textarea");
    }

    #[test]
    fn every_synthesized_locator_resolves_back() {
        let tree = tree();
        for id in all_controls(&tree) {
            let selector = synthesize(&tree, id);
            assert_eq!(resolve(&tree, &selector), Some(id), "{selector}");
            assert_eq!(resolve(&tree, &selector), resolve(&tree, &selector));
        }
    }

    #[test]
    fn malformed_locators_fall_back_to_name() {
        let tree = tree();
        let first = tree.by_name("first");
        assert_eq!(resolve(&tree, "[name=\"first\"x]"), None);
        assert_eq!(resolve(&tree, "input[name=first]"), first);
        assert_eq!(resolve(&tree, "name=first"), first);
        assert_eq!(resolve(&tree, "[name='first']"), first);
        assert_eq!(resolve(&tree, "[name=\"say \"hi\"\"]"), tree.by_name("say \"hi\""));
    }

    #[test]
    fn unknown_locators_resolve_to_none() {
        let tree = tree();
        assert_eq!(resolve(&tree, "#missing"), None);
        assert_eq!(resolve(&tree, "body > span"), None);
        assert_eq!(resolve(&tree, ""), None);
        assert_eq!(resolve(&tree, ":::"), None);
    }
}
