use crate::{path::DataPath, Atom, NodeId};
use thiserror::Error;

/// A data path could not be resolved against a document.
///
/// Both variants describe ordinary absence of data and are handled identically by the engine:
/// bindings receive the null sentinel, repeating children see an empty array.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// A key is missing, an array position is out of range, or the `$index` placeholder was used
    /// outside of a repeating scope.
    #[error("no value at `{path}`")]
    NotFound { path: String },

    /// A segment expected an object or array but found something else.
    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl PathError {
    pub(crate) fn not_found(path: &DataPath) -> PathError {
        PathError::NotFound { path: path.to_string() }
    }

    pub(crate) fn type_mismatch(path: &DataPath, expected: &'static str, found: &'static str) -> PathError {
        PathError::TypeMismatch {
            path: path.to_string(),
            expected,
            found,
        }
    }
}

/// Errors returned by tree operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The node is already in the middle of an update cycle.
    #[error("node {0:?} is already updating")]
    Reentrant(NodeId),

    /// The node was destroyed, or never belonged to this tree.
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    /// No applier is registered for the binding's attribute key.
    #[error("no applier registered for attribute `{0}`")]
    UnknownAttribute(Atom),

    #[error(transparent)]
    Path(#[from] PathError),
}
