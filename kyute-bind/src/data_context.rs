//! Per-node data scopes.
//!
//! Every node owns a `DataContext`. Depending on its mode, the context either shares the
//! enclosing document (`Merge`) or owns a copy of it (`Clone`). A `Clone` context can also
//! declare a `Scope`: a set of aliases that re-root paths of the enclosing document under local
//! names. The resolved origins of these aliases form the `ReverseScope`, used to translate paths
//! between the node and its parent when propagating point updates and writes.
use crate::{
    document::Document,
    error::PathError,
    path::{self, DataPath, Segment},
};
use serde_json::{Map, Value};
use tracing::{trace, warn};

/// How a context reacts to a new document.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ContextMode {
    /// The context owns its document; a new document replaces it.
    Clone,
    /// The context shares the enclosing document; a new document is shallow-merged into it.
    #[default]
    Merge,
}

/// Direction of a path translation across a scope boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathOrigin {
    /// The path is expressed in the node's local names and is translated to the enclosing scope.
    External,
    /// The path is expressed in the parent's names and is translated to the node's local names.
    Parent,
}

/// Local name introduced by a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Alias {
    /// The whole local document.
    Root,
    /// A top-level key of the local document.
    Name(String),
}

/// Aliases declared by a node, mapping local names to path templates in the enclosing document.
///
/// Templates may contain `$index`; it is substituted with the node's index when the scope is
/// derived.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    entries: Vec<(Alias, DataPath)>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Roots the local document at `source`.
    #[must_use]
    pub fn root(self, source: impl Into<DataPath>) -> Scope {
        self.with_root(source.into())
    }

    /// Makes the value at `source` available under the local key `name`.
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, source: impl Into<DataPath>) -> Scope {
        let name = name.into();
        let source = source.into();
        match self.entries.iter_mut().find(|(alias, _)| *alias == Alias::Name(name.clone())) {
            Some((_, existing)) => *existing = source,
            None => self.entries.push((Alias::Name(name), source)),
        }
        self
    }

    pub(crate) fn with_root(mut self, source: DataPath) -> Scope {
        self.entries.retain(|(alias, _)| *alias != Alias::Root);
        self.entries.insert(0, (Alias::Root, source));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Alias, DataPath)] {
        &self.entries
    }

    fn root_source(&self) -> Option<&DataPath> {
        self.entries
            .iter()
            .find_map(|(alias, source)| (*alias == Alias::Root).then_some(source))
    }

    /// Computes the local document from the enclosing one.
    ///
    /// Without a root alias the local document is an object holding only the named aliases.
    /// Missing sources are left out; a missing root yields null.
    pub fn derive(&self, outer: &Value, index: Option<usize>) -> Value {
        let mut local = match self.root_source() {
            Some(source) => match path::resolve(source, outer, index) {
                Ok(value) => value.clone(),
                Err(err) => {
                    trace!("scope root `{source}` not found: {err}");
                    Value::Null
                }
            },
            None => Value::Object(Map::new()),
        };

        let mut named = self.entries.iter().filter_map(|(alias, source)| match alias {
            Alias::Name(name) => Some((name, source)),
            Alias::Root => None,
        });
        let Some(first) = named.next() else {
            return local;
        };

        if !local.is_object() {
            warn!("scope root resolves to {}, named aliases need an object", path::value_kind(&local));
            local = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut local {
            for (name, source) in std::iter::once(first).chain(named) {
                if let Ok(value) = path::resolve(source, outer, index) {
                    map.insert(name.clone(), value.clone());
                }
            }
        }
        local
    }

    /// Resolves the origin of every alias for the given index.
    pub fn reverse(&self, index: Option<usize>) -> ReverseScope {
        ReverseScope {
            origins: self
                .entries
                .iter()
                .map(|(alias, source)| (alias.clone(), source.with_index(index)))
                .collect(),
        }
    }
}

/// Resolved origins of a node's aliases, expressed in the enclosing document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReverseScope {
    origins: Vec<(Alias, DataPath)>,
}

impl ReverseScope {
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn origin_of(&self, alias: &Alias) -> Option<&DataPath> {
        self.origins.iter().find_map(|(a, origin)| (a == alias).then_some(origin))
    }

    /// Translates a local path to the enclosing scope.
    ///
    /// A leading named alias takes precedence over the root alias. Paths that match no alias are
    /// returned unchanged.
    pub fn to_enclosing(&self, path: &DataPath) -> DataPath {
        if let Some(Segment::Key(head)) = path.first() {
            if let Some(origin) = self.origin_of(&Alias::Name(head.clone())) {
                return origin.join(&path.tail(1));
            }
        }
        match self.origin_of(&Alias::Root) {
            Some(origin) => origin.join(path),
            None => path.clone(),
        }
    }

    /// Translates a path of the enclosing scope to local names.
    ///
    /// The longest origin that prefixes `path` is substituted by its alias. A path that designates
    /// an ancestor of an origin maps to the whole aliased value. Returns `None` when the path does
    /// not reach into the local document.
    pub fn to_local(&self, path: &DataPath) -> Option<DataPath> {
        if self.is_empty() {
            return Some(path.clone());
        }

        let local_path = |alias: &Alias, rest: DataPath| match alias {
            Alias::Root => rest,
            Alias::Name(name) => DataPath::key(name.clone()).join(&rest),
        };

        let best = self
            .origins
            .iter()
            .filter(|(_, origin)| origin.is_prefix_of(path))
            .max_by_key(|(alias, origin)| (origin.len(), matches!(alias, Alias::Name(_))));
        if let Some((alias, origin)) = best {
            return Some(local_path(alias, path.tail(origin.len())));
        }

        // the path is above the aliased values: the whole slice may have changed
        if self
            .origin_of(&Alias::Root)
            .map_or(false, |origin| path.is_prefix_of(origin))
        {
            return Some(DataPath::root());
        }
        self.origins
            .iter()
            .find(|(_, origin)| path.is_prefix_of(origin))
            .map(|(alias, _)| local_path(alias, DataPath::root()))
    }
}

/// The data scope of a node.
#[derive(Debug)]
pub struct DataContext {
    document: Document,
    index: Option<usize>,
    mode: ContextMode,
    scope: Scope,
    reverse_scope: ReverseScope,
}

impl DataContext {
    /// Creates the context of a node attached under a scope whose document is `enclosing`.
    ///
    /// Declaring a scope implies `Clone` mode.
    pub fn new(mode: ContextMode, enclosing: &Document, index: Option<usize>, scope: Scope) -> DataContext {
        let mode = if scope.is_empty() { mode } else { ContextMode::Clone };
        let document = match mode {
            ContextMode::Merge => enclosing.clone(),
            ContextMode::Clone if scope.is_empty() => Document::new(enclosing.snapshot()),
            ContextMode::Clone => Document::new(scope.derive(&enclosing.borrow(), index)),
        };
        let reverse_scope = scope.reverse(index);
        DataContext {
            document,
            index,
            mode,
            scope,
            reverse_scope,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn reverse_scope(&self) -> &ReverseScope {
        &self.reverse_scope
    }

    /// Resolves a local path.
    pub fn get(&self, path: &DataPath) -> Result<Value, PathError> {
        path::resolve(path, &self.document.borrow(), self.index).cloned()
    }

    /// Shallow-merges the top-level keys of `incoming` into the document.
    ///
    /// Non-object documents are replaced. Merging a document into itself does nothing.
    pub fn update_data_context(&mut self, incoming: &Document) {
        if self.document.shares(incoming) {
            return;
        }
        let incoming = incoming.borrow();
        let mut current = self.document.borrow_mut();
        match (&mut *current, &*incoming) {
            (Value::Object(current), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    current.insert(key.clone(), value.clone());
                }
            }
            (current, incoming) => *current = incoming.clone(),
        }
    }

    /// Replaces the document with `incoming`, or with the slice derived from it if the context has
    /// a scope.
    ///
    /// The replacement happens in place so that contexts sharing this document see it.
    pub fn set_data(&mut self, incoming: &Document) {
        let value = if self.scope.is_empty() {
            incoming.snapshot()
        } else {
            self.scope.derive(&incoming.borrow(), self.index)
        };
        self.document.replace(value);
    }

    /// Applies a new document according to the context mode.
    pub fn apply(&mut self, incoming: &Document) {
        match self.mode {
            ContextMode::Clone => self.set_data(incoming),
            ContextMode::Merge => self.update_data_context(incoming),
        }
    }

    /// Re-derives a `Clone` context from the parent's current document.
    pub fn refresh(&mut self, parent: &Document) {
        if self.mode == ContextMode::Clone && !self.document.shares(parent) {
            self.set_data(parent);
        }
    }

    /// Translates `path` across the scope boundary described by `reverse_scope`.
    ///
    /// See [`ReverseScope::to_enclosing`] and [`ReverseScope::to_local`].
    pub fn aliased_path(path: &DataPath, reverse_scope: &ReverseScope, origin: PathOrigin) -> Option<DataPath> {
        match origin {
            PathOrigin::External => Some(reverse_scope.to_enclosing(path)),
            PathOrigin::Parent => reverse_scope.to_local(path),
        }
    }
}
