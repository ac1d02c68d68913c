use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::event_loop::EventLoop;
use crate::port::FramePort;
use crate::realm::WeakRealm;
use crate::registry::{Template, TemplateRegistry};

pub const DEFAULT_WIDGET_TAG: &str = "custom-dropdown";

/// Whether `tag` can be registered as a custom element: it starts with a
/// lowercase ASCII letter, contains a hyphen, and has no uppercase letters,
/// whitespace or markup characters.
pub fn is_custom_element_name(tag: &str) -> bool {
    tag.starts_with(|c: char| c.is_ascii_lowercase())
        && tag.contains('-')
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetLabels {
    pub placeholder: String,
    pub error: String,
    pub backspace_hint: String,
    pub delete_hint: String,
}

impl Default for WidgetLabels {
    fn default() -> Self {
        Self {
            placeholder: "Select an item".to_string(),
            error: "ERROR".to_string(),
            backspace_hint: "Press Backspace to delete".to_string(),
            delete_hint: "Press Delete to delete".to_string(),
        }
    }
}

/// Everything both realm copies of the selector widget must agree on. This is
/// what crosses into the embedded frame and what the script generator renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetContract {
    pub tag: String,
    /// Persisted attribute carrying the chosen template id.
    pub value_attribute: String,
    /// Highlight-only attribute: `"backspace"` or `"delete"`.
    pub deletable_attribute: String,
    pub tooltip_attribute: String,
    /// Diagnostic id stamped on freshly inserted markup.
    pub marker_attribute: String,
    pub labels: WidgetLabels,
}

impl Default for WidgetContract {
    fn default() -> Self {
        Self {
            tag: DEFAULT_WIDGET_TAG.to_string(),
            value_attribute: "selected-value".to_string(),
            deletable_attribute: "data-deletable".to_string(),
            tooltip_attribute: "title".to_string(),
            marker_attribute: "data-dropdown-id".to_string(),
            labels: WidgetLabels::default(),
        }
    }
}

impl WidgetContract {
    /// Attributes that must never survive serialization of the document.
    pub fn transient_attributes(&self) -> Vec<String> {
        vec![
            self.deletable_attribute.clone(),
            self.tooltip_attribute.clone(),
        ]
    }

    pub fn observed_attributes(&self) -> Vec<String> {
        vec![self.value_attribute.clone()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dropdown_{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// The widget's own (shadow) visual tree: a bordered container holding the
/// choice control, or the error indicator in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetView {
    /// Placeholder first, then one option per template in registry order.
    pub options: Vec<ChoiceOption>,
    pub error: bool,
    pub error_label: String,
}

impl WidgetView {
    pub fn choice_visible(&self) -> bool {
        !self.error
    }

    pub fn selected_option(&self) -> Option<&ChoiceOption> {
        self.options.iter().find(|option| option.selected)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.options
            .iter()
            .skip(1)
            .map(|option| option.label.as_str())
            .collect()
    }
}

/// Pure view computation shared by both realm copies.
///
/// Error state holds iff `selected_value` is non-empty and names no template
/// in `snapshot`. The selection itself is never cleared here.
pub fn compute_view(
    contract: &WidgetContract,
    selected_value: &str,
    snapshot: &[Template],
) -> WidgetView {
    let mut options = Vec::with_capacity(snapshot.len() + 1);
    let mut matched = false;
    for template in snapshot {
        let selected = template.id.as_str() == selected_value;
        matched |= selected;
        options.push(ChoiceOption {
            value: template.id.to_string(),
            label: template.name.clone(),
            selected,
        });
    }
    options.insert(
        0,
        ChoiceOption {
            value: String::new(),
            label: contract.labels.placeholder.clone(),
            selected: !matched,
        },
    );
    WidgetView {
        options,
        error: !selected_value.is_empty() && !matched,
        error_label: contract.labels.error.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetChange {
    pub value: String,
    pub instance_id: InstanceId,
}

/// Per-instance state every widget copy wraps.
#[derive(Debug, Clone)]
pub struct DropdownState {
    contract: Rc<WidgetContract>,
    instance_id: InstanceId,
    selected_value: String,
    snapshot: Vec<Template>,
    view: WidgetView,
}

impl DropdownState {
    pub fn new(contract: Rc<WidgetContract>) -> Self {
        let view = compute_view(&contract, "", &[]);
        Self {
            contract,
            instance_id: InstanceId::next(),
            selected_value: String::new(),
            snapshot: Vec::new(),
            view,
        }
    }

    pub fn contract(&self) -> &WidgetContract {
        &self.contract
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn selected_value(&self) -> &str {
        &self.selected_value
    }

    pub fn set_selected_value(&mut self, value: impl Into<String>) {
        self.selected_value = value.into();
    }

    pub fn view(&self) -> &WidgetView {
        &self.view
    }

    /// Rebuilds the view from the last snapshot this instance fetched.
    pub fn render(&mut self) {
        self.view = compute_view(&self.contract, &self.selected_value, &self.snapshot);
    }

    pub fn apply_snapshot(&mut self, snapshot: Vec<Template>) {
        self.snapshot = snapshot;
        self.render();
    }

    pub fn choose(&mut self, value: &str) -> WidgetChange {
        self.selected_value = value.to_string();
        self.render();
        WidgetChange {
            value: self.selected_value.clone(),
            instance_id: self.instance_id,
        }
    }
}

/// Passed to an instance when it becomes part of a realm's document.
#[derive(Clone)]
pub struct ElementContext {
    pub realm: WeakRealm,
    pub node: NodeId,
    pub scheduler: EventLoop,
}

/// Behaviour contract of one selector widget instance, whichever realm hosts it.
pub trait SelectorElement {
    fn instance_id(&self) -> InstanceId;
    fn selected_value(&self) -> &str;
    fn view(&self) -> &WidgetView;
    fn render(&mut self);
    /// Re-fetches the registry snapshot and rebuilds the option list.
    fn refresh(&mut self);
    fn connected(&mut self, cx: &ElementContext);
    fn attribute_changed(&mut self, name: &str, value: Option<&str>);
    fn choose(&mut self, value: &str) -> WidgetChange;

    fn is_error(&self) -> bool {
        self.view().error
    }
}

pub trait ElementDefinition {
    fn tag(&self) -> &str;
    fn observed_attributes(&self) -> Vec<String>;
    fn construct(&self) -> Box<dyn SelectorElement>;
}

/// Host-realm copy: reads the registry handle it was constructed with.
pub struct HostDropdown {
    state: DropdownState,
    registry: TemplateRegistry,
}

impl HostDropdown {
    pub fn new(contract: Rc<WidgetContract>, registry: TemplateRegistry) -> Self {
        Self {
            state: DropdownState::new(contract),
            registry,
        }
    }
}

impl SelectorElement for HostDropdown {
    fn instance_id(&self) -> InstanceId {
        self.state.instance_id()
    }

    fn selected_value(&self) -> &str {
        self.state.selected_value()
    }

    fn view(&self) -> &WidgetView {
        self.state.view()
    }

    fn render(&mut self) {
        self.state.render();
    }

    fn refresh(&mut self) {
        self.state.apply_snapshot(self.registry.list());
    }

    fn connected(&mut self, _cx: &ElementContext) {
        self.refresh();
    }

    fn attribute_changed(&mut self, name: &str, value: Option<&str>) {
        if name == self.state.contract().value_attribute {
            self.state.set_selected_value(value.unwrap_or_default());
            self.refresh();
        }
    }

    fn choose(&mut self, value: &str) -> WidgetChange {
        self.state.choose(value)
    }
}

/// Embedded-frame copy: reaches the host registry only through its parent
/// port, and refreshes itself once on the turn after it first connects.
pub struct FrameDropdown {
    state: DropdownState,
    port: FramePort,
    self_refresh_scheduled: bool,
}

impl FrameDropdown {
    pub fn new(contract: Rc<WidgetContract>, port: FramePort) -> Self {
        Self {
            state: DropdownState::new(contract),
            port,
            self_refresh_scheduled: false,
        }
    }
}

impl SelectorElement for FrameDropdown {
    fn instance_id(&self) -> InstanceId {
        self.state.instance_id()
    }

    fn selected_value(&self) -> &str {
        self.state.selected_value()
    }

    fn view(&self) -> &WidgetView {
        self.state.view()
    }

    fn render(&mut self) {
        self.state.render();
    }

    fn refresh(&mut self) {
        let snapshot = match self.port.templates() {
            Ok(templates) => templates,
            Err(err) => {
                // Host not reachable yet; render an empty list and wait for
                // the next refresh.
                debug!(
                    "event=widget_refresh module=widget realm=frame status=degraded instance={} reason={err}",
                    self.state.instance_id()
                );
                Vec::new()
            }
        };
        self.state.apply_snapshot(snapshot);
    }

    fn connected(&mut self, cx: &ElementContext) {
        self.refresh();
        if self.self_refresh_scheduled {
            return;
        }
        self.self_refresh_scheduled = true;
        let realm = cx.realm.clone();
        let node = cx.node;
        cx.scheduler.defer("frame-dropdown-self-refresh", move || {
            if let Some(realm) = realm.upgrade() {
                realm.refresh_instance(node);
            }
        });
    }

    fn attribute_changed(&mut self, name: &str, value: Option<&str>) {
        if name == self.state.contract().value_attribute {
            self.state.set_selected_value(value.unwrap_or_default());
            self.refresh();
        }
    }

    fn choose(&mut self, value: &str) -> WidgetChange {
        self.state.choose(value)
    }
}

pub struct HostDropdownDefinition {
    contract: Rc<WidgetContract>,
    registry: TemplateRegistry,
}

impl HostDropdownDefinition {
    pub fn new(contract: Rc<WidgetContract>, registry: TemplateRegistry) -> Self {
        Self { contract, registry }
    }
}

impl ElementDefinition for HostDropdownDefinition {
    fn tag(&self) -> &str {
        &self.contract.tag
    }

    fn observed_attributes(&self) -> Vec<String> {
        self.contract.observed_attributes()
    }

    fn construct(&self) -> Box<dyn SelectorElement> {
        Box::new(HostDropdown::new(
            self.contract.clone(),
            self.registry.clone(),
        ))
    }
}

pub struct FrameDropdownDefinition {
    contract: Rc<WidgetContract>,
    port: FramePort,
}

impl FrameDropdownDefinition {
    pub fn new(contract: Rc<WidgetContract>, port: FramePort) -> Self {
        Self { contract, port }
    }
}

impl ElementDefinition for FrameDropdownDefinition {
    fn tag(&self) -> &str {
        &self.contract.tag
    }

    fn observed_attributes(&self) -> Vec<String> {
        self.contract.observed_attributes()
    }

    fn construct(&self) -> Box<dyn SelectorElement> {
        Box::new(FrameDropdown::new(self.contract.clone(), self.port.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script is not a widget definition: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("script defines an empty tag name")]
    EmptyTag,
}

/// Serialized widget definition, the only form in which a definition enters
/// another realm. The receiving realm builds its own copy from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "script", rename_all = "snake_case")]
pub enum DefinitionScript {
    DefineSelectorWidget { contract: WidgetContract },
}

impl DefinitionScript {
    pub fn selector_widget(contract: &WidgetContract) -> Self {
        DefinitionScript::DefineSelectorWidget {
            contract: contract.clone(),
        }
    }

    pub fn to_source(&self) -> Result<String, ScriptError> {
        serde_json::to_string(self).map_err(ScriptError::from)
    }

    pub fn from_source(source: &str) -> Result<Self, ScriptError> {
        let script: DefinitionScript = serde_json::from_str(source)?;
        let DefinitionScript::DefineSelectorWidget { contract } = &script;
        if contract.tag.trim().is_empty() {
            warn!("event=script_decode module=widget status=rejected reason=empty_tag");
            return Err(ScriptError::EmptyTag);
        }
        Ok(script)
    }
}
