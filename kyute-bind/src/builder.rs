use crate::{
    binding::Binding,
    data_context::{Alias, ContextMode, Scope},
    host::Host,
    listener::UpdateListener,
    path::{DataPath, Segment},
};
use std::fmt;
use tracing::warn;

/// Description of a node about to be inserted in a `NodeTree`.
///
/// The visual is created by the caller (usually a `NodeFactory`). Static children are described
/// by nested builders; their visuals must already be attached to this node's visual.
pub struct NodeBuilder<H: Host> {
    pub(crate) visual: H::Visual,
    pub(crate) template: H::Template,
    pub(crate) child_template: Option<H::Template>,
    pub(crate) repeat: Option<DataPath>,
    pub(crate) styles: Option<H::Styles>,
    pub(crate) mode: ContextMode,
    pub(crate) scope: Scope,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) children: Vec<NodeBuilder<H>>,
    pub(crate) listener: Option<Box<dyn UpdateListener>>,
}

impl<H: Host> NodeBuilder<H> {
    pub fn new(visual: H::Visual, template: H::Template) -> NodeBuilder<H> {
        NodeBuilder {
            visual,
            template,
            child_template: None,
            repeat: None,
            styles: None,
            mode: ContextMode::Merge,
            scope: Scope::new(),
            bindings: vec![],
            children: vec![],
            listener: None,
        }
    }

    /// Repeats `child_template` once for each element of the array at `path`.
    #[must_use]
    pub fn repeat(mut self, path: impl Into<DataPath>, child_template: H::Template) -> Self {
        self.repeat = Some(path.into());
        self.child_template = Some(child_template);
        self
    }

    #[must_use]
    pub fn styles(mut self, styles: H::Styles) -> Self {
        self.styles = Some(styles);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ContextMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Adds a binding if `raw` is a binding expression. Static values are ignored.
    #[must_use]
    pub fn attribute(self, key: &str, raw: &str) -> Self {
        match Binding::parse(key, raw) {
            Some(binding) => self.binding(binding),
            None => self,
        }
    }

    #[must_use]
    pub fn child(mut self, child: NodeBuilder<H>) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: impl UpdateListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn visual(&self) -> &H::Visual {
        &self.visual
    }

    pub fn template(&self) -> &H::Template {
        &self.template
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Roots the node at an element of the array at `repeat`, selected by the node index.
    ///
    /// `repeat` must not contain `$index` anymore. A root alias declared by the node is replaced.
    pub(crate) fn into_repeated(mut self, repeat: &DataPath) -> Self {
        if let Some((_, source)) = self.scope.entries().iter().find(|(alias, _)| *alias == Alias::Root) {
            warn!(
                "{:?}: repeated over `{repeat}`, ignoring its own root alias `{source}`",
                self.template
            );
        }
        self.mode = ContextMode::Clone;
        self.scope = std::mem::take(&mut self.scope).with_root(repeat.clone().push(Segment::Index));
        self
    }
}

impl<H: Host> fmt::Debug for NodeBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("visual", &self.visual)
            .field("template", &self.template)
            .field("repeat", &self.repeat)
            .field("mode", &self.mode)
            .field("bindings", &self.bindings)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
