//! Forwarding binding values to attribute appliers.
use crate::{
    binding::Binding,
    config::EngineConfig,
    host::{Host, Visibility},
    Atom,
};
use serde_json::Value;
use std::{collections::HashMap, fmt, rc::Rc};
use tracing::{trace, warn};

/// Value received by appliers when a direct binding does not resolve.
pub const NULL_SENTINEL: Value = Value::Null;

/// Sets an attribute of a visual.
pub trait AttributeApplier<H: Host> {
    fn apply(&self, host: &mut H, visual: &H::Visual, key: &Atom, value: &Value) -> anyhow::Result<()>;
}

impl<H, F> AttributeApplier<H> for F
where
    H: Host,
    F: Fn(&mut H, &H::Visual, &Value) -> anyhow::Result<()>,
{
    fn apply(&self, host: &mut H, visual: &H::Visual, _key: &Atom, value: &Value) -> anyhow::Result<()> {
        self(host, visual, value)
    }
}

/// Appliers by attribute key.
pub struct AttributeRegistry<H: Host> {
    appliers: HashMap<Atom, Rc<dyn AttributeApplier<H>>>,
}

impl<H: Host> Default for AttributeRegistry<H> {
    fn default() -> Self {
        AttributeRegistry {
            appliers: HashMap::new(),
        }
    }
}

impl<H: Host> AttributeRegistry<H> {
    pub fn new() -> AttributeRegistry<H> {
        AttributeRegistry::default()
    }

    /// Registers the applier for `key`, replacing any previous one.
    pub fn register(&mut self, key: impl Into<Atom>, applier: impl AttributeApplier<H> + 'static) {
        self.appliers.insert(key.into(), Rc::new(applier));
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<Atom>, applier: impl AttributeApplier<H> + 'static) -> Self {
        self.register(key, applier);
        self
    }

    pub fn get(&self, key: &Atom) -> Option<Rc<dyn AttributeApplier<H>>> {
        self.appliers.get(key).cloned()
    }

    pub fn contains(&self, key: &Atom) -> bool {
        self.appliers.contains_key(key)
    }
}

impl<H: Host> fmt::Debug for AttributeRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.appliers.keys()).finish()
    }
}

/// A binding attached to a node, with its applier resolved.
pub(crate) struct BoundAttribute<H: Host> {
    pub(crate) binding: Binding,
    pub(crate) applier: Rc<dyn AttributeApplier<H>>,
}

/// Passes `value` to the applier. Failures are logged.
pub fn dispatch<H: Host>(
    host: &mut H,
    applier: &dyn AttributeApplier<H>,
    visual: &H::Visual,
    key: &Atom,
    value: &Value,
) -> bool {
    match applier.apply(host, visual, key, value) {
        Ok(()) => true,
        Err(err) => {
            warn!("failed to apply attribute `{key}` on {visual:?}: {err:#}");
            false
        }
    }
}

/// Evaluates a bound attribute against `document` and dispatches the result.
///
/// Direct bindings also drive the visibility of the visual, unless they target a visibility
/// attribute.
pub(crate) fn handle_binding<H: Host>(
    host: &mut H,
    config: &EngineConfig,
    visual: &H::Visual,
    bound: &BoundAttribute<H>,
    document: &Value,
    index: Option<usize>,
) -> bool {
    let binding = &bound.binding;
    let key = binding.key();
    let controls_visibility = !binding.has_embedded_reference() && !config.is_visibility_attribute(key);
    let value = match binding.evaluate(document, index) {
        Ok(value) => {
            if controls_visibility {
                host.set_visibility(visual, Visibility::Visible);
            }
            value
        }
        Err(err) => {
            trace!("binding `{key}` = `{}` unresolved: {err}", binding.source());
            if controls_visibility {
                host.set_visibility(visual, Visibility::Gone);
            }
            NULL_SENTINEL
        }
    };
    dispatch(host, &*bound.applier, visual, key, &value)
}
