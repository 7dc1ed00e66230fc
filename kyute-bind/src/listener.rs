//! Update hooks.
use crate::{config::ReentrancyPolicy, error::UpdateError, path::DataPath, NodeId};
use serde_json::Value;

/// Tree operation requested from a hook, executed once the current top-level operation is done.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Deferred {
    Update { node: NodeId, data: Option<Value> },
    Set { node: NodeId, path: DataPath, value: Value },
}

/// Access to the tree from within a hook.
///
/// Hooks run while the tree is borrowed: requests made through this context are queued and run
/// after the operation that triggered the hook.
pub struct ListenerCtx<'a> {
    pub(crate) node: NodeId,
    pub(crate) policy: ReentrancyPolicy,
    pub(crate) is_updating: &'a dyn Fn(NodeId) -> bool,
    pub(crate) deferred: &'a mut Vec<Deferred>,
}

impl<'a> ListenerCtx<'a> {
    /// The node whose update triggered the hook.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_updating(&self, node: NodeId) -> bool {
        (self.is_updating)(node)
    }

    fn check_reentrancy(&self, node: NodeId) -> Result<(), UpdateError> {
        if self.policy == ReentrancyPolicy::Reject && self.is_updating(node) {
            Err(UpdateError::Reentrant(node))
        } else {
            Ok(())
        }
    }

    /// Requests a full update of `node`.
    pub fn request_update(&mut self, node: NodeId, data: Option<Value>) -> Result<(), UpdateError> {
        self.check_reentrancy(node)?;
        self.deferred.push(Deferred::Update { node, data });
        Ok(())
    }

    /// Requests a write at `path` followed by a point update.
    pub fn request_set(
        &mut self,
        node: NodeId,
        path: impl Into<DataPath>,
        value: impl Into<Value>,
    ) -> Result<(), UpdateError> {
        self.check_reentrancy(node)?;
        self.deferred.push(Deferred::Set {
            node,
            path: path.into(),
            value: value.into(),
        });
        Ok(())
    }
}

/// Observes and overrides the data flowing through a node during full updates.
///
/// Returning `None` from an overriding hook keeps the data unchanged.
pub trait UpdateListener {
    /// Called before the incoming document is applied. `data` is `None` when the node is
    /// refreshed without new data.
    fn before_update_data(&mut self, cx: &mut ListenerCtx, data: Option<&Value>) -> Option<Value> {
        let _ = (cx, data);
        None
    }

    /// Called once the data context holds the new document. The returned value, if any, is used
    /// for the bindings and the children instead of the context's document.
    fn after_data_context(&mut self, cx: &mut ListenerCtx, data: &Value) -> Option<Value> {
        let _ = (cx, data);
        None
    }

    /// Called after the bindings and the children have been updated.
    fn update_complete(&mut self, cx: &mut ListenerCtx, data: &Value) {
        let _ = (cx, data);
    }
}
