//! Data binding for retained UI trees.
//!
//! Nodes hold bindings from attribute keys to paths in a JSON document. A `NodeTree` keeps the
//! attributes of the nodes in sync with the document and maintains lists of children repeated over
//! arrays of the document. Changes can be pushed as whole documents (`NodeTree::update`) or as
//! single paths (`NodeTree::update_at_path`, `NodeTree::set`), in which case only the bindings
//! reading that path are dispatched again.
//!
//! The widgets themselves are provided by a `Host`, new nodes by a `NodeFactory`, and attribute
//! values are forwarded to the `AttributeApplier`s of an `AttributeRegistry`.

// public modules
pub mod path;

// internal modules
mod atom;
mod binding;
mod builder;
mod config;
mod data_context;
mod dispatch;
mod document;
mod error;
mod host;
mod listener;
mod reconcile;
mod tree;

// public exports
pub use atom::Atom;
pub use binding::{Binding, Expression, Part, DIRECT_PREFIX};
pub use builder::NodeBuilder;
pub use config::{EngineConfig, ReentrancyPolicy};
pub use data_context::{Alias, ContextMode, DataContext, PathOrigin, ReverseScope, Scope};
pub use dispatch::{dispatch, AttributeApplier, AttributeRegistry, NULL_SENTINEL};
pub use document::Document;
pub use error::{PathError, UpdateError};
pub use host::{BuildRequest, Host, NodeFactory, Visibility};
pub use listener::{ListenerCtx, UpdateListener};
pub use path::{DataPath, Segment};
pub use tree::{ChangeFlags, Node, NodeId, NodeTree};
