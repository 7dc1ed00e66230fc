//! The node arena and the update protocol.
use crate::{
    binding::Binding,
    builder::NodeBuilder,
    config::EngineConfig,
    data_context::{ContextMode, DataContext, PathOrigin},
    dispatch::{handle_binding, AttributeRegistry, BoundAttribute},
    document::Document,
    error::UpdateError,
    host::{Host, NodeFactory},
    listener::{Deferred, ListenerCtx, UpdateListener},
    path::{self, DataPath, Segment},
    reconcile::reconcile_children,
};
use bitflags::bitflags;
use serde_json::Value;
use slotmap::SlotMap;
use std::{fmt, mem, rc::Rc};
use tracing::{trace, trace_span, warn};

slotmap::new_key_type! {
    /// Identifies a node in a `NodeTree`.
    pub struct NodeId;
}

bitflags! {
    /// What changed during an update.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        const NONE = 0;
        /// Attributes were dispatched to the host.
        const BINDINGS = (1 << 0);
        /// Children were added or removed.
        const STRUCTURE = (1 << 1);
    }
}

/// Whether an update runs the listener hooks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Pass {
    /// A full update cycle.
    Full,
    /// Propagation of a point update. Hooks are skipped.
    Point,
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// A node of the tree.
pub struct Node<H: Host> {
    pub(crate) visual: H::Visual,
    pub(crate) template: H::Template,
    pub(crate) child_template: Option<H::Template>,
    pub(crate) repeat: Option<DataPath>,
    pub(crate) styles: Option<H::Styles>,
    pub(crate) context: DataContext,
    pub(crate) bindings: Vec<BoundAttribute<H>>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) listener: Option<Box<dyn UpdateListener>>,
    pub(crate) updating: bool,
}

impl<H: Host> Node<H> {
    pub fn visual(&self) -> &H::Visual {
        &self.visual
    }

    pub fn template(&self) -> &H::Template {
        &self.template
    }

    pub fn child_template(&self) -> Option<&H::Template> {
        self.child_template.as_ref()
    }

    /// Path of the array driving the children, if the node repeats its child template.
    pub fn repeat(&self) -> Option<&DataPath> {
        self.repeat.as_ref()
    }

    pub fn styles(&self) -> Option<&H::Styles> {
        self.styles.as_ref()
    }

    pub fn context(&self) -> &DataContext {
        &self.context
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> + '_ {
        self.bindings.iter().map(|bound| &bound.binding)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn index(&self) -> Option<usize> {
        self.context.index()
    }
}

impl<H: Host> fmt::Debug for Node<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("visual", &self.visual)
            .field("template", &self.template)
            .field("repeat", &self.repeat)
            .field("context", &self.context)
            .field("children", &self.children)
            .field("parent", &self.parent)
            .field("updating", &self.updating)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Data-bound nodes and the host displaying them.
///
/// The tree owns every node. Operations are synchronous and never run twice on the same node at
/// the same time: listener hooks can only queue further operations, which run once the operation
/// that invoked the hook is done.
pub struct NodeTree<H: Host> {
    pub(crate) nodes: SlotMap<NodeId, Node<H>>,
    pub(crate) host: H,
    pub(crate) factory: Box<dyn NodeFactory<H>>,
    registry: AttributeRegistry<H>,
    pub(crate) config: Rc<EngineConfig>,
    deferred: Vec<Deferred>,
}

impl<H: Host> NodeTree<H> {
    pub fn new(
        host: H,
        factory: impl NodeFactory<H> + 'static,
        registry: AttributeRegistry<H>,
        config: Rc<EngineConfig>,
    ) -> NodeTree<H> {
        NodeTree {
            nodes: SlotMap::with_key(),
            host,
            factory: Box::new(factory),
            registry,
            config,
            deferred: vec![],
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AttributeRegistry<H> {
        &self.registry
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<H>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Children of the node. Empty if the node doesn't exist.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the node is in the middle of an update.
    pub fn is_updating(&self, id: NodeId) -> bool {
        self.nodes.get(id).map_or(false, |node| node.updating)
    }

    fn check_idle(&self, id: NodeId) -> Result<&Node<H>, UpdateError> {
        let node = self.nodes.get(id).ok_or(UpdateError::UnknownNode(id))?;
        if node.updating {
            return Err(UpdateError::Reentrant(id));
        }
        Ok(node)
    }

    /// Inserts a root node and runs its first update with `data`.
    pub fn mount(&mut self, builder: NodeBuilder<H>, data: Value) -> Result<NodeId, UpdateError> {
        let document = Document::new(data);
        let id = self.insert_subtree(None, builder, None, &document);
        self.update_node(id, None, Pass::Full)?;
        self.flush_deferred();
        Ok(id)
    }

    fn bind(&self, binding: Binding) -> Result<BoundAttribute<H>, UpdateError> {
        let applier = self
            .registry
            .get(binding.key())
            .ok_or_else(|| UpdateError::UnknownAttribute(binding.key().clone()))?;
        Ok(BoundAttribute { binding, applier })
    }

    /// Inserts a node and its static descendants.
    pub(crate) fn insert_subtree(
        &mut self,
        parent: Option<NodeId>,
        builder: NodeBuilder<H>,
        index: Option<usize>,
        enclosing: &Document,
    ) -> NodeId {
        let NodeBuilder {
            visual,
            template,
            child_template,
            repeat,
            styles,
            mode,
            scope,
            bindings,
            children,
            listener,
        } = builder;

        let context = DataContext::new(mode, enclosing, index, scope);
        let document = context.document().clone();
        let bindings = bindings
            .into_iter()
            .filter_map(|binding| match self.bind(binding) {
                Ok(bound) => Some(bound),
                Err(err) => {
                    warn!("{template:?}: {err}");
                    None
                }
            })
            .collect();

        let children = if repeat.is_some() && !children.is_empty() {
            warn!("{template:?}: repeating nodes cannot have static children, ignoring them");
            for child in children {
                self.release_builder(child);
            }
            vec![]
        } else {
            children
        };

        let id = self.nodes.insert(Node {
            visual,
            template,
            child_template,
            repeat,
            styles,
            context,
            bindings,
            children: vec![],
            parent,
            listener,
            updating: false,
        });

        for child in children {
            let child_id = self.insert_subtree(Some(id), child, index, &document);
            if let Some(node) = self.nodes.get_mut(id) {
                node.children.push(child_id);
            }
        }
        id
    }

    fn release_builder(&mut self, builder: NodeBuilder<H>) {
        for child in builder.children {
            self.release_builder(child);
        }
        self.host.release(builder.visual);
    }

    /// Attaches a binding to an existing node. It is evaluated on the next update.
    pub fn add_binding(&mut self, id: NodeId, binding: Binding) -> Result<(), UpdateError> {
        self.check_idle(id)?;
        let bound = self.bind(binding)?;
        if let Some(node) = self.nodes.get_mut(id) {
            node.bindings.push(bound);
        }
        Ok(())
    }

    /// Sets the update listener of a node, returning the previous one.
    pub fn set_listener(
        &mut self,
        id: NodeId,
        listener: impl UpdateListener + 'static,
    ) -> Result<Option<Box<dyn UpdateListener>>, UpdateError> {
        let node = self.nodes.get_mut(id).ok_or(UpdateError::UnknownNode(id))?;
        Ok(node.listener.replace(Box::new(listener)))
    }

    pub fn remove_listener(&mut self, id: NodeId) -> Option<Box<dyn UpdateListener>> {
        self.nodes.get_mut(id)?.listener.take()
    }

    pub fn listener(&self, id: NodeId) -> Option<&dyn UpdateListener> {
        self.nodes.get(id)?.listener.as_deref()
    }

    /// Reads a value from the node's data context.
    pub fn get(&self, id: NodeId, path: impl Into<DataPath>) -> Result<Value, UpdateError> {
        let node = self.nodes.get(id).ok_or(UpdateError::UnknownNode(id))?;
        Ok(node.context.get(&path.into())?)
    }

    /// Runs a full update cycle on a node and its descendants.
    ///
    /// With `None`, the node is refreshed from the data it already holds.
    pub fn update(&mut self, id: NodeId, data: Option<Value>) -> Result<ChangeFlags, UpdateError> {
        let flags = self.update_node(id, data.map(Document::new), Pass::Full)?;
        self.flush_deferred();
        Ok(flags)
    }

    /// Calls `f` with the listener of the node, if there's one.
    fn with_listener<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn UpdateListener, &mut ListenerCtx) -> R,
    ) -> Option<R> {
        let mut listener = self.nodes.get_mut(id)?.listener.take()?;
        let nodes = &self.nodes;
        let is_updating = |node: NodeId| nodes.get(node).map_or(false, |node| node.updating);
        let mut cx = ListenerCtx {
            node: id,
            policy: self.config.reentrancy,
            is_updating: &is_updating,
            deferred: &mut self.deferred,
        };
        let result = f(&mut *listener, &mut cx);
        if let Some(node) = self.nodes.get_mut(id) {
            node.listener = Some(listener);
        }
        Some(result)
    }

    pub(crate) fn update_node(
        &mut self,
        id: NodeId,
        incoming: Option<Document>,
        pass: Pass,
    ) -> Result<ChangeFlags, UpdateError> {
        let node = self.check_idle(id)?;
        let _span = trace_span!("update", node = ?id, ?pass).entered();
        if self.config.log_updates {
            trace!("START {id:?} {:?}", node.template);
        }
        let hooks = pass == Pass::Full;

        let replacement = if hooks {
            self.with_listener(id, |listener, cx| {
                let data = incoming.as_ref().map(Document::borrow);
                listener.before_update_data(cx, data.as_deref())
            })
        } else {
            None
        };
        let incoming = match replacement {
            Some(Some(replacement)) => Some(Document::new(replacement)),
            _ => incoming,
        };

        let Some(node) = self.nodes.get_mut(id) else {
            return Err(UpdateError::UnknownNode(id));
        };
        node.updating = true;
        if let Some(incoming) = &incoming {
            node.context.apply(incoming);
        }
        let index = node.context.index();
        let document = node.context.document().clone();

        let replacement = if hooks {
            self.with_listener(id, |listener, cx| listener.after_data_context(cx, &document.borrow()))
        } else {
            None
        };
        let effective = match replacement {
            Some(Some(replacement)) => Document::new(replacement),
            _ => document,
        };

        let mut flags = ChangeFlags::NONE;
        let proceed = !effective.is_null();
        if proceed {
            flags |= self.refresh_bindings(id, &effective, index);
            flags |= self.update_children(id, &effective, pass);
        } else {
            trace!("{id:?}: null document, skipping bindings and children");
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.updating = false;
        }
        if proceed && hooks {
            self.with_listener(id, |listener, cx| listener.update_complete(cx, &effective.borrow()));
        }

        if self.config.log_updates {
            if let Some(node) = self.nodes.get(id) {
                trace!("END {id:?} {:?} {flags:?}", node.template);
            }
        }
        Ok(flags)
    }

    /// Dispatches every binding of the node, in order.
    fn refresh_bindings(&mut self, id: NodeId, document: &Document, index: Option<usize>) -> ChangeFlags {
        let NodeTree { nodes, host, config, .. } = self;
        let Some(node) = nodes.get(id) else {
            return ChangeFlags::NONE;
        };
        if node.bindings.is_empty() {
            return ChangeFlags::NONE;
        }
        let document = document.borrow();
        for bound in &node.bindings {
            handle_binding(host, config, &node.visual, bound, &document, index);
        }
        ChangeFlags::BINDINGS
    }

    fn update_children(&mut self, id: NodeId, document: &Document, pass: Pass) -> ChangeFlags {
        let Some(node) = self.nodes.get(id) else {
            return ChangeFlags::NONE;
        };
        if node.repeat.is_some() {
            return reconcile_children(self, id, document, pass);
        }

        let mut flags = ChangeFlags::NONE;
        for child in node.children.clone() {
            match self.update_node(child, Some(document.clone()), pass) {
                Ok(child_flags) => flags |= child_flags,
                Err(err) => warn!("failed to update child {child:?} of {id:?}: {err}"),
            }
        }
        flags
    }

    /// Propagates a change of the value at `path` to the bindings reading it.
    ///
    /// `path` is relative to the node's data context. Listener hooks are not called.
    ///
    /// When `path` contains the array of a repeating node, its children are reconciled with the
    /// array: the survivors are fully refreshed and the children built for new elements get their
    /// bindings applied, all without hooks.
    pub fn update_at_path(
        &mut self,
        id: NodeId,
        path: impl Into<DataPath>,
    ) -> Result<ChangeFlags, UpdateError> {
        let node = self.check_idle(id)?;
        let path = path.into().with_index(node.context.index());
        let flags = self.update_path_node(id, &path);
        self.flush_deferred();
        Ok(flags)
    }

    fn update_path_node(&mut self, id: NodeId, path: &DataPath) -> ChangeFlags {
        let Some(node) = self.nodes.get_mut(id) else {
            return ChangeFlags::NONE;
        };
        if node.updating {
            warn!("{id:?} is already updating, ignoring change at `{path}`");
            return ChangeFlags::NONE;
        }
        let _span = trace_span!("update_at_path", node = ?id, %path).entered();
        node.updating = true;
        let index = node.context.index();
        let document = node.context.document().clone();

        let mut flags = ChangeFlags::NONE;
        {
            let NodeTree { nodes, host, config, .. } = &mut *self;
            if let Some(node) = nodes.get(id) {
                let data = document.borrow();
                for bound in node.bindings.iter().filter(|bound| bound.binding.refers_to(path, index)) {
                    handle_binding(host, config, &node.visual, bound, &data, index);
                    flags |= ChangeFlags::BINDINGS;
                }
            }
        }

        let repeat = self
            .nodes
            .get(id)
            .and_then(|node| node.repeat.as_ref())
            .map(|repeat| repeat.with_index(index));
        match repeat {
            Some(repeat) if path.is_prefix_of(&repeat) => {
                flags |= reconcile_children(self, id, &document, Pass::Point);
            }
            _ => {
                for child in self.children(id).to_vec() {
                    let Some(child_node) = self.nodes.get_mut(child) else {
                        continue;
                    };
                    let reverse_scope = child_node.context.reverse_scope();
                    let Some(local) = DataContext::aliased_path(path, reverse_scope, PathOrigin::Parent) else {
                        continue;
                    };
                    child_node.context.refresh(&document);
                    flags |= self.update_path_node(child, &local);
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.updating = false;
        }
        flags
    }

    /// Writes `value` at `path` and propagates the change.
    ///
    /// `path` is relative to the node's data context. The write happens in the document of the
    /// root of the node, with the path translated through the scopes in between, and the change
    /// is then propagated from the root.
    pub fn set(
        &mut self,
        id: NodeId,
        path: impl Into<DataPath>,
        value: impl Into<Value>,
    ) -> Result<ChangeFlags, UpdateError> {
        let flags = self.set_value(id, path.into(), value.into())?;
        self.flush_deferred();
        Ok(flags)
    }

    fn set_value(&mut self, id: NodeId, path: DataPath, value: Value) -> Result<ChangeFlags, UpdateError> {
        let node = self.check_idle(id)?;
        let mut path = path.with_index(node.context.index());
        let mut target = id;
        while let Some(node) = self.nodes.get(target) {
            let Some(parent) = node.parent else { break };
            if node.context.mode() == ContextMode::Clone {
                // scopes are only ever on `Clone` contexts; `Merge` contexts use their parent's names
                path = node.context.reverse_scope().to_enclosing(&path);
            }
            target = parent;
        }

        let node = self.check_idle(target)?;
        let index = node.context.index();
        path::write(&path, &mut node.context.document().borrow_mut(), index, value)?;
        trace!("set `{path}` on {target:?}");
        Ok(self.update_path_node(target, &path))
    }

    /// Removes a node and its descendants, detaching its visual from the parent's container.
    ///
    /// If the parent repeats its children, the following siblings move down one position and are
    /// re-rooted at their new array element. Their attributes are refreshed on the next update.
    ///
    /// Returns `false` if the node was already destroyed.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let mut followers = None;
        if let Some(parent) = node.parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                if let Some(position) = parent_node.children.iter().position(|child| *child == id) {
                    parent_node.children.remove(position);
                    let container = parent_node.visual.clone();
                    self.host.remove_child_at(&container, position);
                    followers = Some((parent, position));
                }
            }
        }
        self.destroy_subtree(id);

        if let Some((parent, from)) = followers {
            self.reindex_children(parent, from);
        }
        true
    }

    /// Re-roots the repeated children of `id` from position `from` onwards at their positions.
    fn reindex_children(&mut self, id: NodeId, from: usize) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let index = node.context.index();
        let Some(repeat) = node.repeat.as_ref().map(|repeat| repeat.with_index(index)) else {
            return;
        };
        let document = node.context.document().clone();
        let children = node.children.get(from..).unwrap_or(&[]).to_vec();
        for (offset, child) in children.into_iter().enumerate() {
            let root = repeat.clone().push(Segment::Index);
            self.reattach(child, &document, Some(from + offset), Some(root));
        }
        self.verify_container(id);
    }

    /// Rebuilds the data context of a node for `index`, and those of its descendants.
    ///
    /// `root` replaces the root alias of the node's scope.
    fn reattach(&mut self, id: NodeId, enclosing: &Document, index: Option<usize>, root: Option<DataPath>) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let mut scope = node.context.scope().clone();
        if let Some(root) = root {
            scope = scope.with_root(root);
        }
        node.context = DataContext::new(node.context.mode(), enclosing, index, scope);
        trace!("{id:?} moved to {index:?}");

        let document = node.context.document().clone();
        let repeat = node.repeat.as_ref().map(|repeat| repeat.with_index(index));
        for (position, child) in node.children.clone().into_iter().enumerate() {
            match &repeat {
                Some(repeat) => {
                    let root = repeat.clone().push(Segment::Index);
                    self.reattach(child, &document, Some(position), Some(root));
                }
                None => self.reattach(child, &document, index, None),
            }
        }
    }

    /// Removes a node and its descendants without touching the parent.
    pub(crate) fn destroy_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        for child in node.children.into_iter().rev() {
            self.destroy_subtree(child);
        }
        self.host.release(node.visual);
    }

    /// Runs the operations queued by listener hooks.
    fn flush_deferred(&mut self) {
        let mut rounds = 0;
        while !self.deferred.is_empty() {
            if rounds == self.config.max_deferred_rounds {
                warn!(
                    "dropping {} deferred operations after {rounds} rounds",
                    self.deferred.len()
                );
                self.deferred.clear();
                break;
            }
            rounds += 1;
            for request in mem::take(&mut self.deferred) {
                let result = match request {
                    Deferred::Update { node, data } => self.update_node(node, data.map(Document::new), Pass::Full),
                    Deferred::Set { node, path, value } => self.set_value(node, path, value),
                };
                if let Err(err) = result {
                    warn!("deferred operation failed: {err}");
                }
            }
        }
    }

    /// Checks that the container of a node holds exactly the visuals of its children.
    pub(crate) fn verify_container(&self, id: NodeId) {
        if !self.config.verify_containers {
            return;
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let count = self.host.child_count(&node.visual);
        if count != node.children.len() {
            warn!(
                "container of {id:?} holds {count} visuals, expected {}",
                node.children.len()
            );
            return;
        }
        for (position, child) in node.children.iter().enumerate() {
            let expected = self.nodes.get(*child).map(|child| &child.visual);
            let actual = self.host.child_at(&node.visual, position);
            if expected != actual.as_ref() {
                warn!("container of {id:?} out of sync at {position}: expected {expected:?}, found {actual:?}");
            }
        }
    }
}

impl<H: Host + fmt::Debug> fmt::Debug for NodeTree<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .field("host", &self.host)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
