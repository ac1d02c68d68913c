use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::bus::{EventBus, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_seq(seq: u64) -> Self {
        Self(seq.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Position in the id generator's sequence, when the id was issued by one.
    pub fn seq(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TemplateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TemplateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
}

impl Template {
    pub fn new(id: impl Into<TemplateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Structural change: add, rename, or remove.
    Changed,
    /// A record was deleted. Always preceded by `Changed` for the same removal.
    Removed { id: TemplateId },
    /// Management selection moved. Not a structural change.
    SelectionChanged { id: Option<TemplateId> },
}

#[derive(Debug)]
struct RegistryState {
    templates: Vec<Template>,
    next_seq: u64,
    selected: Option<TemplateId>,
}

/// Ordered template store shared by every widget in every realm.
///
/// The handle is cheap to clone; clones observe the same records. Notifications
/// go out after the internal borrow is released, so subscribers may read the
/// registry while handling them.
#[derive(Clone)]
pub struct TemplateRegistry {
    state: Rc<RefCell<RegistryState>>,
    events: EventBus<RegistryEvent>,
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("state", &self.state.borrow())
            .finish()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_seed(Vec::new())
    }
}

impl TemplateRegistry {
    /// Seeds the registry. The id generator continues after the highest numeric
    /// seed id so seeded ids are never reissued. A seed id with no successor
    /// in `u64` is treated as non-numeric.
    pub fn with_seed(seed: Vec<Template>) -> Self {
        let next_seq = seed
            .iter()
            .filter_map(|t| t.id.seq()?.checked_add(1))
            .max()
            .unwrap_or(1);
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                templates: seed,
                next_seq,
                selected: None,
            })),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&RegistryEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn list(&self) -> Vec<Template> {
        self.state.borrow().templates.clone()
    }

    pub fn get_by_id(&self, id: &TemplateId) -> Option<Template> {
        self.state
            .borrow()
            .templates
            .iter()
            .find(|t| &t.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn selected(&self) -> Option<Template> {
        let state = self.state.borrow();
        let id = state.selected.as_ref()?;
        state.templates.iter().find(|t| &t.id == id).cloned()
    }

    pub fn add(&self, initial_name: impl Into<String>) -> Template {
        let template = {
            let mut state = self.state.borrow_mut();
            let mut seq = state.next_seq;
            while state.templates.iter().any(|t| t.id.seq() == Some(seq)) {
                seq = seq.wrapping_add(1);
            }
            let template = Template {
                id: TemplateId::from_seq(seq),
                name: initial_name.into(),
            };
            state.next_seq = seq.wrapping_add(1);
            state.templates.push(template.clone());
            state.selected = Some(template.id.clone());
            template
        };
        info!(
            "event=template_add module=registry id={} count={}",
            template.id,
            self.len()
        );
        self.events.emit(&RegistryEvent::SelectionChanged {
            id: Some(template.id.clone()),
        });
        self.events.emit(&RegistryEvent::Changed);
        template
    }

    /// Deletes `id`, but only while it is the currently selected record.
    pub fn remove(&self, id: &TemplateId) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.selected.as_ref() != Some(id) {
                return false;
            }
            state.templates.retain(|t| &t.id != id);
            state.selected = None;
        }
        info!(
            "event=template_remove module=registry id={id} count={}",
            self.len()
        );
        self.events
            .emit(&RegistryEvent::SelectionChanged { id: None });
        self.events.emit(&RegistryEvent::Changed);
        self.events
            .emit(&RegistryEvent::Removed { id: id.clone() });
        true
    }

    pub fn remove_selected(&self) -> Option<TemplateId> {
        let id = self.state.borrow().selected.clone()?;
        self.remove(&id).then_some(id)
    }

    /// Renames `id` when it is the selected record and `new_name` is not blank.
    /// The stored name is trimmed.
    pub fn rename(&self, id: &TemplateId, new_name: &str) -> bool {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return false;
        }
        {
            let mut state = self.state.borrow_mut();
            if state.selected.as_ref() != Some(id) {
                return false;
            }
            let Some(template) = state.templates.iter_mut().find(|t| &t.id == id) else {
                return false;
            };
            template.name = trimmed.to_string();
        }
        info!("event=template_rename module=registry id={id}");
        self.events.emit(&RegistryEvent::Changed);
        true
    }

    /// Selects `id`; an unknown id clears the selection.
    pub fn select(&self, id: &TemplateId) -> Option<Template> {
        let selected = {
            let mut state = self.state.borrow_mut();
            let found = state.templates.iter().find(|t| &t.id == id).cloned();
            state.selected = found.as_ref().map(|t| t.id.clone());
            found
        };
        self.events.emit(&RegistryEvent::SelectionChanged {
            id: selected.as_ref().map(|t| t.id.clone()),
        });
        selected
    }
}
