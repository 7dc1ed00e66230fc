use serde_json::Value;
use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

/// A shared, mutable data document.
///
/// Cloning a `Document` shares the underlying value: nodes in `Merge` mode hold a clone of their
/// parent's document and observe every mutation made through it.
#[derive(Clone, Default)]
pub struct Document(Rc<RefCell<Value>>);

impl Document {
    pub fn new(value: Value) -> Document {
        Document(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, Value> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Value> {
        self.0.borrow_mut()
    }

    /// Replaces the value in place, returning the previous one.
    pub fn replace(&self, value: Value) -> Value {
        self.0.replace(value)
    }

    /// Whether both handles point to the same value.
    pub fn shares(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a deep copy of the current value.
    pub fn snapshot(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn is_null(&self) -> bool {
        self.0.borrow().is_null()
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::new(value)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => f.debug_tuple("Document").field(&*value).finish(),
            Err(_) => f.write_str("Document(<borrowed>)"),
        }
    }
}
