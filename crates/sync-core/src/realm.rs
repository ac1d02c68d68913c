use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::event_loop::EventLoop;
use crate::markup::MarkupError;
use crate::port::FramePort;
use crate::registry::TemplateRegistry;
use crate::widget::{
    DefinitionScript, ElementContext, ElementDefinition, FrameDropdownDefinition,
    HostDropdownDefinition, InstanceId, ScriptError, SelectorElement, WidgetView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealmKind {
    Host,
    Frame,
}

impl fmt::Display for RealmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealmKind::Host => f.write_str("host"),
            RealmKind::Frame => f.write_str("frame"),
        }
    }
}

/// How code running inside a realm reaches the template registry.
#[derive(Debug, Clone)]
pub enum RealmEnvironment {
    Host { registry: TemplateRegistry },
    Frame { parent: FramePort },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
    Document,
    Node(NodeId),
}

/// Bubbling change event fired by a widget after a user choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetChangeEvent {
    pub realm: RealmKind,
    pub target: NodeId,
    pub value: String,
    pub instance_id: InstanceId,
}

type ChangeHandler = Rc<dyn Fn(&WidgetChangeEvent)>;

struct ChangeListener {
    id: ListenerId,
    target: ListenerTarget,
    handler: ChangeHandler,
}

/// One rendering context: a document, its element definitions, and the widget
/// instances upgraded inside it. Nothing here is shared with another realm.
pub struct Realm {
    kind: RealmKind,
    env: RealmEnvironment,
    document: Document,
    definitions: BTreeMap<String, Rc<dyn ElementDefinition>>,
    instances: BTreeMap<NodeId, Box<dyn SelectorElement>>,
    listeners: Vec<ChangeListener>,
    next_listener: u64,
    ready: bool,
    scheduler: EventLoop,
    self_ref: WeakRealm,
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("kind", &self.kind)
            .field("ready", &self.ready)
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl Realm {
    pub fn kind(&self) -> RealmKind {
        self.kind
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Tag names compare case-insensitively, like element names in markup.
    pub fn is_defined(&self, tag: &str) -> bool {
        self.definitions.contains_key(&tag.to_ascii_lowercase())
    }

    pub fn instance(&self, node: NodeId) -> Option<&dyn SelectorElement> {
        self.instances.get(&node).map(|element| element.as_ref())
    }

    /// Connected nodes backed by a live instance, in document order.
    pub fn instance_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .instances
            .keys()
            .copied()
            .filter(|node| self.document.is_connected(*node))
            .collect();
        let order = self.document.descendants(self.document.body());
        nodes.sort_by_key(|node| order.iter().position(|n| n == node));
        nodes
    }

    /// Connected elements carrying `tag` that no instance backs yet.
    pub fn pending_elements(&self, tag: &str) -> Vec<NodeId> {
        self.document
            .query_all(tag)
            .into_iter()
            .filter(|node| !self.instances.contains_key(node))
            .collect()
    }

    fn define(&mut self, definition: Rc<dyn ElementDefinition>) -> bool {
        let tag = definition.tag().to_ascii_lowercase();
        if self.definitions.contains_key(&tag) {
            debug!(
                "event=define module=realm realm={} tag={tag} status=already_defined",
                self.kind
            );
            return false;
        }
        info!(
            "event=define module=realm realm={} tag={tag} status=ok",
            self.kind
        );
        self.definitions.insert(tag, definition);
        true
    }

    fn definition_from_script(
        &self,
        script: DefinitionScript,
    ) -> Result<Rc<dyn ElementDefinition>, ScriptError> {
        let DefinitionScript::DefineSelectorWidget { contract } = script;
        let contract = Rc::new(contract);
        let definition: Rc<dyn ElementDefinition> = match &self.env {
            RealmEnvironment::Host { registry } => {
                Rc::new(HostDropdownDefinition::new(contract, registry.clone()))
            }
            RealmEnvironment::Frame { parent } => {
                Rc::new(FrameDropdownDefinition::new(contract, parent.clone()))
            }
        };
        Ok(definition)
    }

    /// Drops instances and node listeners whose element left the document.
    fn prune_disconnected(&mut self) {
        let document = &self.document;
        self.instances
            .retain(|node, _| document.is_connected(*node));
        self.listeners.retain(|listener| match listener.target {
            ListenerTarget::Node(node) => document.is_connected(node),
            ListenerTarget::Document => true,
        });
    }

    fn upgrade(&mut self) -> Vec<NodeId> {
        self.prune_disconnected();
        let definitions: Vec<(String, Rc<dyn ElementDefinition>)> = self
            .definitions
            .iter()
            .map(|(tag, definition)| (tag.clone(), definition.clone()))
            .collect();

        let mut upgraded = Vec::new();
        for (tag, definition) in definitions {
            for node in self.pending_elements(&tag) {
                let mut element = definition.construct();
                for name in definition.observed_attributes() {
                    if let Some(value) = self.document.attribute(node, &name) {
                        element.attribute_changed(&name, Some(value));
                    }
                }
                element.connected(&ElementContext {
                    realm: self.self_ref.clone(),
                    node,
                    scheduler: self.scheduler.clone(),
                });
                debug!(
                    "event=upgrade module=realm realm={} tag={tag} instance={}",
                    self.kind,
                    element.instance_id()
                );
                self.instances.insert(node, element);
                upgraded.push(node);
            }
        }
        upgraded
    }

    fn refresh_all(&mut self) -> usize {
        self.prune_disconnected();
        for element in self.instances.values_mut() {
            element.refresh();
        }
        self.instances.len()
    }

    fn bubbling_handlers(&self, target: NodeId) -> Vec<ChangeHandler> {
        let mut path = vec![target];
        let mut current = self.document.parent(target);
        while let Some(node) = current {
            path.push(node);
            current = self.document.parent(node);
        }

        let mut handlers = Vec::new();
        for node in path {
            handlers.extend(
                self.listeners
                    .iter()
                    .filter(|l| l.target == ListenerTarget::Node(node))
                    .map(|l| l.handler.clone()),
            );
        }
        handlers.extend(
            self.listeners
                .iter()
                .filter(|l| l.target == ListenerTarget::Document)
                .map(|l| l.handler.clone()),
        );
        handlers
    }
}

#[derive(Clone, Default)]
pub struct WeakRealm(Weak<RefCell<Realm>>);

impl WeakRealm {
    pub fn upgrade(&self) -> Option<RealmHandle> {
        self.0.upgrade().map(RealmHandle)
    }
}

/// Shared handle to a [`Realm`]. Every method keeps its borrow short and
/// runs listeners only after releasing it.
#[derive(Clone)]
pub struct RealmHandle(Rc<RefCell<Realm>>);

impl fmt::Debug for RealmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0.borrow(), f)
    }
}

impl RealmHandle {
    pub fn new(kind: RealmKind, env: RealmEnvironment, scheduler: EventLoop) -> Self {
        let inner = Rc::new_cyclic(|weak| {
            RefCell::new(Realm {
                kind,
                env,
                document: Document::new(),
                definitions: BTreeMap::new(),
                instances: BTreeMap::new(),
                listeners: Vec::new(),
                next_listener: 1,
                ready: kind == RealmKind::Host,
                scheduler,
                self_ref: WeakRealm(weak.clone()),
            })
        });
        RealmHandle(inner)
    }

    pub fn host(registry: TemplateRegistry, scheduler: EventLoop) -> Self {
        Self::new(
            RealmKind::Host,
            RealmEnvironment::Host { registry },
            scheduler,
        )
    }

    pub fn frame(parent: FramePort, scheduler: EventLoop) -> Self {
        Self::new(
            RealmKind::Frame,
            RealmEnvironment::Frame { parent },
            scheduler,
        )
    }

    pub fn downgrade(&self) -> WeakRealm {
        WeakRealm(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &RealmHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, Realm> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Realm> {
        self.0.borrow_mut()
    }

    pub fn kind(&self) -> RealmKind {
        self.0.borrow().kind
    }

    pub fn is_ready(&self) -> bool {
        self.0.borrow().ready
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.borrow_mut().ready = ready;
    }

    pub fn parent_port(&self) -> Option<FramePort> {
        match &self.0.borrow().env {
            RealmEnvironment::Frame { parent } => Some(parent.clone()),
            RealmEnvironment::Host { .. } => None,
        }
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.0.borrow().is_defined(tag)
    }

    /// Registers `definition` and upgrades matching elements already present.
    pub fn define(&self, definition: Rc<dyn ElementDefinition>) -> bool {
        let mut realm = self.0.borrow_mut();
        let defined = realm.define(definition);
        if defined {
            realm.upgrade();
        }
        defined
    }

    /// Runs a serialized definition inside this realm. The realm builds its
    /// own copy of the widget from it, wired to its own registry route.
    pub fn execute_script(&self, source: &str) -> Result<bool, ScriptError> {
        let script = DefinitionScript::from_source(source)?;
        let definition = self.0.borrow().definition_from_script(script)?;
        Ok(self.define(definition))
    }

    /// Materializes every pending element of a defined tag.
    pub fn upgrade(&self) -> Vec<NodeId> {
        self.0.borrow_mut().upgrade()
    }

    pub fn refresh_all(&self) -> usize {
        self.0.borrow_mut().refresh_all()
    }

    /// Refreshes one instance; a no-op when `node` is gone or was never upgraded.
    pub fn refresh_instance(&self, node: NodeId) -> bool {
        let mut realm = self.0.borrow_mut();
        if !realm.document.is_connected(node) {
            return false;
        }
        match realm.instances.get_mut(&node) {
            Some(element) => {
                element.refresh();
                true
            }
            None => false,
        }
    }

    pub fn pending_elements(&self, tag: &str) -> Vec<NodeId> {
        self.0.borrow().pending_elements(tag)
    }

    pub fn instance_nodes(&self) -> Vec<NodeId> {
        self.0.borrow().instance_nodes()
    }

    pub fn is_upgraded(&self, node: NodeId) -> bool {
        self.0.borrow().instances.contains_key(&node)
    }

    pub fn view(&self, node: NodeId) -> Option<WidgetView> {
        self.0.borrow().instance(node).map(|element| element.view().clone())
    }

    pub fn selected_value(&self, node: NodeId) -> Option<String> {
        self.0
            .borrow()
            .instance(node)
            .map(|element| element.selected_value().to_string())
    }

    pub fn instance_id(&self, node: NodeId) -> Option<InstanceId> {
        self.0.borrow().instance(node).map(|element| element.instance_id())
    }

    /// Applies a user choice to the widget at `node`: updates its state,
    /// persists the value attribute, then dispatches a bubbling change event.
    pub fn choose(&self, node: NodeId, value: &str) -> Option<WidgetChangeEvent> {
        let (event, handlers) = {
            let mut realm = self.0.borrow_mut();
            let kind = realm.kind;
            let tag = realm.document.tag(node)?.to_string();
            let value_attribute = realm
                .definitions
                .get(&tag)?
                .observed_attributes()
                .into_iter()
                .next()?;
            let element = realm.instances.get_mut(&node)?;
            let change = element.choose(value);
            realm
                .document
                .set_attribute(node, value_attribute, change.value.clone());
            let event = WidgetChangeEvent {
                realm: kind,
                target: node,
                value: change.value,
                instance_id: change.instance_id,
            };
            (event, realm.bubbling_handlers(node))
        };
        debug!(
            "event=widget_change module=realm realm={} instance={} value={}",
            event.realm, event.instance_id, event.value
        );
        for handler in handlers {
            handler(&event);
        }
        Some(event)
    }

    /// Sets an attribute, forwarding observed ones to the backing instance.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut realm = self.0.borrow_mut();
        realm.document.set_attribute(node, name, value);
        let observed = realm
            .document
            .tag(node)
            .and_then(|tag| realm.definitions.get(tag))
            .is_some_and(|definition| {
                definition
                    .observed_attributes()
                    .iter()
                    .any(|attr| attr == name)
            });
        if observed {
            if let Some(element) = realm.instances.get_mut(&node) {
                element.attribute_changed(name, Some(value));
            }
        }
    }

    /// Replaces the whole body. Every instance is destroyed; the new elements
    /// stay plain until the next upgrade.
    pub fn replace_content(&self, markup: &str) -> Result<Vec<NodeId>, MarkupError> {
        let mut realm = self.0.borrow_mut();
        let body = realm.document.body();
        let nodes = realm.document.set_inner_markup(body, markup)?;
        let destroyed = realm.instances.len();
        realm.instances.clear();
        realm.prune_disconnected();
        debug!(
            "event=replace_content module=realm realm={} destroyed={destroyed}",
            realm.kind
        );
        Ok(nodes)
    }

    /// Inserts markup through the realm's DOM API; defined tags upgrade at once.
    pub fn append_markup(&self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, MarkupError> {
        let mut realm = self.0.borrow_mut();
        let index = realm.document.child_count(parent);
        let nodes = realm.document.insert_markup(parent, index, markup)?;
        realm.upgrade();
        Ok(nodes)
    }

    pub fn remove_node(&self, node: NodeId) -> bool {
        let mut realm = self.0.borrow_mut();
        let removed = realm.document.detach(node);
        if removed {
            realm.prune_disconnected();
        }
        removed
    }

    /// Simulates a reload: document, definitions and instances are all lost.
    pub fn reset(&self) {
        let mut realm = self.0.borrow_mut();
        realm.document = Document::new();
        realm.definitions.clear();
        realm.instances.clear();
        realm.prune_disconnected();
        info!("event=reset module=realm realm={}", realm.kind);
    }

    pub fn add_change_listener(
        &self,
        target: ListenerTarget,
        handler: impl Fn(&WidgetChangeEvent) + 'static,
    ) -> ListenerId {
        let mut realm = self.0.borrow_mut();
        let id = ListenerId(realm.next_listener);
        realm.next_listener += 1;
        realm.listeners.push(ChangeListener {
            id,
            target,
            handler: Rc::new(handler),
        });
        id
    }

    pub fn listener_count(&self) -> usize {
        self.0.borrow().listeners.len()
    }

    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        let mut realm = self.0.borrow_mut();
        let before = realm.listeners.len();
        realm.listeners.retain(|listener| listener.id != id);
        realm.listeners.len() != before
    }
}
