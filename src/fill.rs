use tokio_util::sync::CancellationToken;

use crate::dom::{Document, DomEvent, DomTree, NodeId};
use crate::error::Result;
use crate::model::{DataRow, FieldTag, MappedField};
use crate::selector;

/// Checkbox and radio values: `true`, `1` or `yes`, trimmed and case-insensitive.
pub fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    ["true", "1", "yes"].iter().any(|t| v.eq_ignore_ascii_case(t))
}

/// Write one row into the live fields of a step.
///
/// Fields without a column are left alone, and fields whose locator no longer
/// resolves are skipped. Every locator is resolved against a fresh read of the
/// document, since a write may re-render the form. Returns `Ok(false)` only
/// when `stop` was cancelled before every field was processed.
pub async fn fill<D: Document + ?Sized>(
    doc: &D,
    fields: &[MappedField],
    row: &DataRow,
    stop: &CancellationToken,
) -> Result<bool> {
    for mapped in fields {
        if stop.is_cancelled() {
            tracing::debug!("fill interrupted by stop request");
            return Ok(false);
        }
        let Some(column) = mapped.map_to.as_deref() else {
            continue;
        };
        let tree = doc.tree().await?;
        let Some(node) = selector::resolve(&tree, &mapped.field.selector) else {
            tracing::debug!(selector = %mapped.field.selector, "field not found, skipping");
            continue;
        };
        let value = row.get(column).unwrap_or_default();
        write(doc, &tree, node, mapped, value).await?;
    }
    Ok(true)
}

async fn write<D: Document + ?Sized>(
    doc: &D,
    tree: &DomTree,
    node: NodeId,
    mapped: &MappedField,
    value: &str,
) -> Result<()> {
    let live_tag = FieldTag::from_tag(tree.tag(node)).unwrap_or(mapped.field.tag);
    let live_type = tree
        .node(node)
        .map(|n| n.input_type())
        .unwrap_or_else(|| mapped.field.input_type.clone());

    match (live_tag, live_type.as_str()) {
        (FieldTag::Select, _) => {
            let option = matching_option(tree, node, value);
            doc.set_value(node, option.as_deref().unwrap_or(value)).await
        }
        (FieldTag::Input, "checkbox" | "radio") => doc.set_checked(node, is_truthy(value)).await,
        _ => {
            doc.set_value(node, value).await?;
            doc.dispatch(node, DomEvent::Input).await?;
            doc.dispatch(node, DomEvent::Change).await
        }
    }
}

/// Value of the option whose value, or else whose text, equals `wanted`.
fn matching_option(tree: &DomTree, select: NodeId, wanted: &str) -> Option<String> {
    let options: Vec<NodeId> = tree
        .descendants(select)
        .into_iter()
        .filter(|o| tree.tag(*o) == "option")
        .collect();
    let by_value = options
        .iter()
        .find(|o| tree.node(**o).is_some_and(|n| n.value == wanted));
    let by_text = || options.iter().find(|o| tree.text_content(**o) == wanted);
    by_value
        .or_else(by_text)
        .and_then(|o| tree.node(*o))
        .map(|n| n.value.clone())
}
