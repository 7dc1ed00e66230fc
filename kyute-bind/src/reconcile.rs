use crate::{
    document::Document,
    host::{BuildRequest, Host},
    path::{self, DataPath},
    tree::{ChangeFlags, NodeTree, Pass},
    NodeId,
};
use anyhow::Context;
use serde_json::Value;
use tracing::{error, trace, warn};

/// Matches the children of a repeating node to the array at its repeat path.
///
/// # Return value
/// `ChangeFlags::STRUCTURE` if any child was added or removed, plus the change flags of the child
/// updates.
///
/// # Details
/// Children are matched to array elements by position:
/// - if the array is missing or isn't an array, it is treated as empty
/// - extra children are removed from the tail, last first; each one is detached from the container
///   and destroyed before the next
/// - the remaining children are updated in place with `document`
/// - then a child is built for each new element, appended to the container and updated
///
/// Child updates run with `pass`, so a point update reconciles without calling listener hooks.
///
/// There is no keyed matching: this is stable under appends and removals at the end of the
/// array, but inserting or removing in the middle rebinds the following children to new
/// positions.
pub(crate) fn reconcile_children<H: Host>(
    tree: &mut NodeTree<H>,
    id: NodeId,
    document: &Document,
    pass: Pass,
) -> ChangeFlags {
    let Some(node) = tree.nodes.get(id) else {
        return ChangeFlags::NONE;
    };
    let index = node.context.index();
    let Some(repeat) = node.repeat.as_ref().map(|repeat| repeat.with_index(index)) else {
        return ChangeFlags::NONE;
    };
    let container = node.visual.clone();

    let count = match path::resolve(&repeat, &document.borrow(), index) {
        Ok(Value::Array(items)) => items.len(),
        Ok(other) => {
            trace!("`{repeat}` is {}, not an array", path::value_kind(other));
            0
        }
        Err(err) => {
            trace!("`{repeat}` not resolved: {err}");
            0
        }
    };

    let mut flags = ChangeFlags::NONE;

    // shrink
    while let Some((child, position)) = tree
        .nodes
        .get_mut(id)
        .filter(|node| node.children.len() > count)
        .and_then(|node| Some((node.children.pop()?, node.children.len())))
    {
        tree.host.remove_child_at(&container, position);
        tree.destroy_subtree(child);
        flags |= ChangeFlags::STRUCTURE;
    }

    // update in place
    let existing = tree.children(id).to_vec();
    for child in &existing {
        match tree.update_node(*child, Some(document.clone()), pass) {
            Ok(child_flags) => flags |= child_flags,
            Err(err) => warn!("failed to update child {child:?} of {id:?}: {err}"),
        }
    }

    // grow
    for position in existing.len()..count {
        match grow_child(tree, id, &repeat, document, position, pass) {
            Ok(child_flags) => flags |= child_flags,
            Err(err) => {
                error!("failed to build child {position} of {id:?}: {err:#}");
                break;
            }
        }
    }

    tree.verify_container(id);
    flags
}

/// Builds the child at `position`, attaches it and runs its first update.
fn grow_child<H: Host>(
    tree: &mut NodeTree<H>,
    id: NodeId,
    repeat: &DataPath,
    document: &Document,
    position: usize,
    pass: Pass,
) -> anyhow::Result<ChangeFlags> {
    let NodeTree { nodes, host, factory, .. } = &mut *tree;
    let node = nodes.get(id).context("repeating node was destroyed")?;
    let template = node
        .child_template
        .as_ref()
        .with_context(|| format!("{:?} repeats `{repeat}` without a child template", node.template))?;
    let builder = {
        let data = document.borrow();
        factory.build(
            host,
            BuildRequest {
                container: &node.visual,
                template,
                data: &*data,
                index: position,
                styles: node.styles.as_ref(),
            },
        )?
    };
    let container = node.visual.clone();

    let builder = builder.into_repeated(repeat);
    tree.host.append_child(&container, builder.visual());
    let child = tree.insert_subtree(Some(id), builder, Some(position), document);
    if let Some(node) = tree.nodes.get_mut(id) {
        node.children.push(child);
    }
    let flags = tree.update_node(child, Some(document.clone()), pass)?;
    Ok(flags | ChangeFlags::STRUCTURE)
}
