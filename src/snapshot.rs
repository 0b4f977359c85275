use crate::dom::{Document, DomTree, NodeId};
use crate::error::Result;
use crate::heuristics::Heuristics;
use crate::model::{FieldDescriptor, FieldTag, PageSnapshot};
use crate::selector;

/// Fillable controls of `form`, hidden inputs excluded, in document order.
pub fn form_fields(tree: &DomTree, form: NodeId) -> Vec<FieldDescriptor> {
    tree.descendants(form)
        .into_iter()
        .filter_map(|id| describe(tree, id))
        .collect()
}

fn describe(tree: &DomTree, id: NodeId) -> Option<FieldDescriptor> {
    let node = tree.node(id)?;
    let tag = FieldTag::from_tag(&node.tag)?;
    let input_type = node.input_type();
    if input_type == "hidden" {
        return None;
    }
    let label = tree
        .label_for(id)
        .or_else(|| node.attr("placeholder").map(|p| p.trim().to_string()))
        .unwrap_or_default();
    Some(FieldDescriptor {
        selector: selector::synthesize(tree, id),
        tag,
        input_type,
        name: node.attr("name").unwrap_or_default().to_string(),
        dom_id: node.attr("id").unwrap_or_default().to_string(),
        label,
    })
}

/// Snapshot of the current form in an already-read tree. A tree without any
/// form produces a snapshot with no fields.
pub fn snapshot_tree(
    tree: &DomTree,
    heuristics: &Heuristics,
    url: impl Into<String>,
    title: impl Into<String>,
) -> PageSnapshot {
    let fields = heuristics
        .current_form(tree)
        .map(|form| form_fields(tree, form))
        .unwrap_or_default();
    PageSnapshot {
        title: title.into(),
        url: url.into(),
        fields,
        advance: None,
    }
}

/// Read the document and snapshot its current form.
pub async fn snapshot<D: Document + ?Sized>(
    doc: &D,
    heuristics: &Heuristics,
) -> Result<PageSnapshot> {
    let tree = doc.tree().await?;
    let url = doc.url().await?;
    let title = doc.title().await?;
    Ok(snapshot_tree(&tree, heuristics, url, title))
}
