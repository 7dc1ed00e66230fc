//! Interfaces to the UI toolkit hosting the nodes.
use crate::builder::NodeBuilder;
use serde_json::Value;
use std::fmt;

/// Visibility state requested by direct bindings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    /// Hidden and taking no space.
    Gone,
}

/// The visual side of the tree: widget handles and their containers.
///
/// Every node holds a `Visual`. A node's children are displayed in the node's own visual, which
/// acts as their container.
pub trait Host {
    /// Handle to a widget.
    type Visual: Clone + PartialEq + fmt::Debug;
    /// Description of a node, interpreted by the `NodeFactory`.
    type Template: Clone + fmt::Debug;
    /// Style context handed to the factory when building children.
    type Styles: Clone;

    fn child_count(&self, container: &Self::Visual) -> usize;
    fn child_at(&self, container: &Self::Visual, index: usize) -> Option<Self::Visual>;
    fn remove_child_at(&mut self, container: &Self::Visual, index: usize);
    fn append_child(&mut self, container: &Self::Visual, child: &Self::Visual);
    fn set_visibility(&mut self, visual: &Self::Visual, visibility: Visibility);

    /// Called when the node holding `visual` is destroyed.
    fn release(&mut self, visual: Self::Visual) {
        let _ = visual;
    }
}

/// Arguments of `NodeFactory::build`.
pub struct BuildRequest<'a, H: Host> {
    /// The visual of the repeating node; the built visual will be appended to it.
    pub container: &'a H::Visual,
    pub template: &'a H::Template,
    /// Document of the repeating node.
    pub data: &'a Value,
    /// Position of the new child in the repeated array.
    pub index: usize,
    pub styles: Option<&'a H::Styles>,
}

/// Materializes nodes from templates. Used when repeated children are added.
///
/// The returned builder describes the new node and its static descendants. The factory must not
/// attach the visual of the root of the builder to `container`, the engine does that.
pub trait NodeFactory<H: Host> {
    fn build(&mut self, host: &mut H, request: BuildRequest<'_, H>) -> anyhow::Result<NodeBuilder<H>>;
}

impl<H, F> NodeFactory<H> for F
where
    H: Host,
    F: FnMut(&mut H, BuildRequest<'_, H>) -> anyhow::Result<NodeBuilder<H>>,
{
    fn build(&mut self, host: &mut H, request: BuildRequest<'_, H>) -> anyhow::Result<NodeBuilder<H>> {
        self(host, request)
    }
}
