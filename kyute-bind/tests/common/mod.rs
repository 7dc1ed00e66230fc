//! Recording host and factory shared by the integration tests.
#![allow(dead_code)]

use anyhow::bail;
use kyute_bind::{
    Atom, AttributeApplier, AttributeRegistry, BuildRequest, EngineConfig, Host, NodeBuilder, NodeFactory, NodeId,
    NodeTree, Scope, Visibility,
};
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

pub type Visual = u32;

/// A widget description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub repeat: Option<(String, Box<Template>)>,
    pub children: Vec<Template>,
    /// `(alias, source)`; an empty alias roots the scope.
    pub scope: Vec<(String, String)>,
}

impl Template {
    pub fn new(name: &str) -> Template {
        Template {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: &str, raw: &str) -> Template {
        self.attributes.push((key.to_owned(), raw.to_owned()));
        self
    }

    pub fn repeat(mut self, path: &str, child: Template) -> Template {
        self.repeat = Some((path.to_owned(), Box::new(child)));
        self
    }

    pub fn child(mut self, child: Template) -> Template {
        self.children.push(child);
        self
    }

    pub fn alias(mut self, name: &str, source: &str) -> Template {
        self.scope.push((name.to_owned(), source.to_owned()));
        self
    }
}

#[derive(Debug, Default)]
pub struct MockHost {
    next_visual: Visual,
    pub names: HashMap<Visual, String>,
    pub containers: HashMap<Visual, Vec<Visual>>,
    pub applied: Vec<(Visual, String, Value)>,
    pub visibility: HashMap<Visual, Visibility>,
    pub released: Vec<Visual>,
}

impl MockHost {
    pub fn create(&mut self, name: &str) -> Visual {
        self.next_visual += 1;
        self.names.insert(self.next_visual, name.to_owned());
        self.next_visual
    }

    /// Values dispatched to `key` on `visual`, oldest first.
    pub fn applied_to(&self, visual: Visual, key: &str) -> Vec<Value> {
        self.applied
            .iter()
            .filter(|(v, k, _)| *v == visual && k == key)
            .map(|(_, _, value)| value.clone())
            .collect()
    }

    pub fn last(&self, visual: Visual, key: &str) -> Option<Value> {
        self.applied_to(visual, key).pop()
    }

    pub fn container(&self, visual: Visual) -> &[Visual] {
        self.containers.get(&visual).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Host for MockHost {
    type Visual = Visual;
    type Template = Template;
    type Styles = String;

    fn child_count(&self, container: &Visual) -> usize {
        self.container(*container).len()
    }

    fn child_at(&self, container: &Visual, index: usize) -> Option<Visual> {
        self.container(*container).get(index).copied()
    }

    fn remove_child_at(&mut self, container: &Visual, index: usize) {
        let children = self.containers.entry(*container).or_default();
        assert!(index < children.len(), "removing {index} from a container of {}", children.len());
        children.remove(index);
    }

    fn append_child(&mut self, container: &Visual, child: &Visual) {
        self.containers.entry(*container).or_default().push(*child);
    }

    fn set_visibility(&mut self, visual: &Visual, visibility: Visibility) {
        self.visibility.insert(*visual, visibility);
    }

    fn release(&mut self, visual: Visual) {
        self.released.push(visual);
    }
}

/// Creates the visuals of a template and its static children.
pub fn instantiate(host: &mut MockHost, template: &Template) -> NodeBuilder<MockHost> {
    let visual = host.create(&template.name);
    let mut builder = NodeBuilder::new(visual, template.clone());
    for (key, raw) in &template.attributes {
        builder = builder.attribute(key, raw);
    }
    if !template.scope.is_empty() {
        let mut scope = Scope::new();
        for (name, source) in &template.scope {
            scope = if name.is_empty() {
                scope.root(source.as_str())
            } else {
                scope.alias(name.as_str(), source.as_str())
            };
        }
        builder = builder.scope(scope);
    }
    if let Some((path, child)) = &template.repeat {
        builder = builder.repeat(path.as_str(), (**child).clone());
    }
    for child in &template.children {
        let child = instantiate(host, child);
        host.append_child(&visual, child.visual());
        builder = builder.child(child);
    }
    builder
}

/// Factory counting the nodes it builds.
#[derive(Clone, Default)]
pub struct MockFactory {
    pub builds: Rc<Cell<usize>>,
    /// Index at which building fails.
    pub fail_at: Rc<Cell<Option<usize>>>,
    /// Styles received with each request.
    pub styles: Rc<RefCell<Vec<Option<String>>>>,
}

impl NodeFactory<MockHost> for MockFactory {
    fn build(
        &mut self,
        host: &mut MockHost,
        request: BuildRequest<'_, MockHost>,
    ) -> anyhow::Result<NodeBuilder<MockHost>> {
        if self.fail_at.get() == Some(request.index) {
            bail!("cannot build `{}` at {}", request.template.name, request.index);
        }
        self.builds.set(self.builds.get() + 1);
        self.styles.borrow_mut().push(request.styles.cloned());
        Ok(instantiate(host, request.template))
    }
}

/// Applier recording every value in the host.
pub struct Recorder;

impl AttributeApplier<MockHost> for Recorder {
    fn apply(&self, host: &mut MockHost, visual: &Visual, key: &Atom, value: &Value) -> anyhow::Result<()> {
        host.applied.push((*visual, key.to_string(), value.clone()));
        Ok(())
    }
}

pub fn registry() -> AttributeRegistry<MockHost> {
    AttributeRegistry::new()
        .with("text", Recorder)
        .with("title", Recorder)
        .with("visibility", Recorder)
        .with("broken", |_: &mut MockHost, _: &Visual, _: &Value| -> anyhow::Result<()> {
            bail!("broken applier")
        })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub tree: NodeTree<MockHost>,
    pub root: NodeId,
    pub factory: MockFactory,
}

impl Fixture {
    pub fn new(template: &Template, data: Value) -> Fixture {
        Fixture::with_config(template, data, EngineConfig::default(), MockFactory::default())
    }

    pub fn with_config(template: &Template, data: Value, config: EngineConfig, factory: MockFactory) -> Fixture {
        init_tracing();
        let mut host = MockHost::default();
        let builder = instantiate(&mut host, template);
        let mut tree = NodeTree::new(host, factory.clone(), registry(), Rc::new(config));
        let root = tree.mount(builder, data).expect("mount failed");
        Fixture { tree, root, factory }
    }

    pub fn host(&self) -> &MockHost {
        self.tree.host()
    }

    pub fn visual(&self, id: NodeId) -> Visual {
        *self.tree.node(id).expect("node destroyed").visual()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id).to_vec()
    }

    pub fn last(&self, id: NodeId, key: &str) -> Option<Value> {
        self.host().last(self.visual(id), key)
    }

    pub fn count(&self, id: NodeId, key: &str) -> usize {
        self.host().applied_to(self.visual(id), key).len()
    }

    pub fn clear_log(&mut self) {
        self.tree.host_mut().applied.clear();
    }
}

/// `{"items": [{"name": ...}, ...]}`
pub fn items(names: &[&str]) -> Value {
    let items: Vec<Value> = names.iter().map(|name| serde_json::json!({ "name": name })).collect();
    serde_json::json!({ "items": items })
}

/// A list repeating a `text` node bound to `name` over `items`.
pub fn list_template() -> Template {
    Template::new("list").repeat("items", Template::new("row").attr("text", "~name"))
}
