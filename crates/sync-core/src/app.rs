use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::activator::Activator;
use crate::adjacency::{
    Direction, Highlight, Position, SelectionRange, apply_highlight, deletable_candidates,
    resolve_target, widget_at,
};
use crate::bus::SubscriptionId;
use crate::config::{ConfigError, SyncConfig};
use crate::dom::{NodeId, SerializeOptions};
use crate::event_loop::EventLoop;
use crate::markup::{escape_attribute, escape_text};
use crate::panel::{ManagementPanel, PanelView};
use crate::port::HostPort;
use crate::realm::RealmHandle;
use crate::registry::{Template, TemplateId, TemplateRegistry};
use crate::surface::{DocumentSurface, RichTextSurface, SurfaceError, SurfaceEvent};
use crate::widget::{HostDropdownDefinition, WidgetContract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "char", rename_all = "snake_case")]
pub enum Key {
    Backspace,
    Delete,
    Enter,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
    Character(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// The keystroke removed a widget; the editor must not delete characters.
    PreventDefault { removed: NodeId },
    Default,
}

/// Wires the registry, both realms, the activator, the management panel and
/// the editor surface together.
pub struct TemplateApp {
    config: SyncConfig,
    contract: Rc<WidgetContract>,
    scheduler: EventLoop,
    registry: TemplateRegistry,
    host: RealmHandle,
    host_port: HostPort,
    activator: Rc<Activator>,
    panel: Rc<RefCell<ManagementPanel>>,
    surface: Box<dyn RichTextSurface>,
    surface_subscription: SubscriptionId,
    next_marker: Cell<u64>,
}

impl TemplateApp {
    pub fn new(
        config: SyncConfig,
        surface: Box<dyn RichTextSurface>,
        scheduler: EventLoop,
    ) -> Result<Self, ConfigError> {
        let config = config.with_defaults();
        config.validate()?;

        let contract = Rc::new(config.widget.clone());
        let registry = TemplateRegistry::with_seed(config.seed_templates.clone());
        let host = RealmHandle::host(registry.clone(), scheduler.clone());
        host.define(Rc::new(HostDropdownDefinition::new(
            contract.clone(),
            registry.clone(),
        )));

        let activator = Activator::new(
            contract.clone(),
            registry.clone(),
            host.clone(),
            surface.frame_slot(),
            scheduler.clone(),
        );
        activator.attach();

        let weak: Weak<Activator> = Rc::downgrade(&activator);
        let surface_subscription = surface.events().subscribe(move |event| {
            if let SurfaceEvent::ContentSet { .. } = event {
                if let Some(activator) = weak.upgrade() {
                    activator.schedule_activation("content-set");
                }
            }
        });

        info!(
            "event=app_init module=app tag={} seeded={}",
            contract.tag,
            registry.len()
        );

        Ok(Self {
            host_port: HostPort::new(registry.clone()),
            config,
            contract,
            scheduler,
            registry,
            host,
            activator,
            panel: Rc::new(RefCell::new(ManagementPanel::new())),
            surface,
            surface_subscription,
            next_marker: Cell::new(1),
        })
    }

    /// Builds the app over an in-memory [`DocumentSurface`] that strips the
    /// contract's transient attributes when serializing.
    pub fn with_document_surface(config: SyncConfig) -> Result<Self, ConfigError> {
        let scheduler = EventLoop::new();
        let serialize = SerializeOptions::skipping(config.widget.transient_attributes());
        let surface = DocumentSurface::new(scheduler.clone(), serialize);
        Self::new(config, Box::new(surface), scheduler)
    }

    /// Brings up the editor: creates the frame, opens its port onto the host
    /// registry and seeds the initial text. Activation follows on a later turn.
    pub fn start(&mut self) -> Result<RealmHandle, SurfaceError> {
        let frame = self.surface.initialize();
        if let Some(port) = frame.parent_port() {
            self.host_port.connect(&port);
        }
        let seed = escape_text(&self.config.initial_content);
        self.surface.set_content(&seed)?;
        self.activator.activate_custom_dropdowns();
        info!("event=app_start module=app status=ok");
        Ok(frame)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn contract(&self) -> &WidgetContract {
        &self.contract
    }

    pub fn scheduler(&self) -> &EventLoop {
        &self.scheduler
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn host(&self) -> &RealmHandle {
        &self.host
    }

    pub fn frame(&self) -> Option<RealmHandle> {
        self.surface.frame()
    }

    pub fn activator(&self) -> &Rc<Activator> {
        &self.activator
    }

    pub fn surface(&self) -> &dyn RichTextSurface {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> &mut dyn RichTextSurface {
        self.surface.as_mut()
    }

    pub fn run_until_idle(&self) -> usize {
        self.scheduler.run_until_idle(self.config.max_turns)
    }

    pub fn panel_view(&self) -> PanelView {
        self.panel.borrow().render(&self.registry)
    }

    pub fn add_template(&self) -> Template {
        let template = self.registry.add(self.config.new_template_name.clone());
        self.panel.borrow_mut().sync_selection(&self.registry);

        let panel = Rc::downgrade(&self.panel);
        self.scheduler.defer("focus-edit-input", move || {
            if let Some(panel) = panel.upgrade() {
                panel.borrow_mut().focus_and_select_all();
            }
        });
        template
    }

    pub fn remove_selected_template(&self) -> Option<TemplateId> {
        let removed = self.registry.remove_selected();
        self.panel.borrow_mut().clear_edit();
        removed
    }

    pub fn select_template(&self, id: &TemplateId) -> Option<Template> {
        let selected = self.registry.select(id);
        self.panel.borrow_mut().sync_selection(&self.registry);
        selected
    }

    pub fn edit_input(&self, value: &str) {
        self.panel.borrow_mut().set_edit_value(value);
    }

    /// Enter commits the rename; other keys are plain typing.
    pub fn edit_key_press(&self, key: Key) -> bool {
        match key {
            Key::Enter => self.commit_edit(),
            _ => false,
        }
    }

    pub fn edit_blur(&self) -> bool {
        self.panel.borrow_mut().blur();
        self.commit_edit()
    }

    /// Renames the selected record from the input. A blank value is
    /// discarded and the input goes back to the stored name.
    pub fn commit_edit(&self) -> bool {
        let Some(selected) = self.registry.selected() else {
            return false;
        };
        let value = self.panel.borrow().edit_value().to_string();
        let renamed = self.registry.rename(&selected.id, &value);
        self.panel.borrow_mut().sync_selection(&self.registry);
        renamed
    }

    /// Inserts a fresh widget at the editor cursor. The editor materializes
    /// it later, so activation and a full refresh run on the next turn.
    pub fn insert_dropdown(&mut self) -> Result<NodeId, SurfaceError> {
        let marker = self.next_marker.get();
        self.next_marker.set(marker + 1);
        let contract = &self.contract;
        let markup = format!(
            "<{tag} {value_attr}=\"\" {marker_attr}=\"{marker_value}\"></{tag}>",
            tag = contract.tag,
            value_attr = contract.value_attribute,
            marker_attr = contract.marker_attribute,
            marker_value = escape_attribute(&format!("dropdown_{marker}")),
        );
        let nodes = self.surface.insert_content(&markup)?;
        let node = nodes.first().copied().ok_or(SurfaceError::NothingInserted)?;
        debug!("event=insert_dropdown module=app marker=dropdown_{marker}");
        self.activator
            .schedule_refresh_and_activation("dropdown-inserted");
        Ok(node)
    }

    /// Backspace and Delete remove the widget they target and swallow the
    /// keystroke. A selection spanning more than one widget is left to the
    /// editor's own multi-node deletion.
    pub fn editor_key_down(&mut self, key: Key) -> KeyDisposition {
        let direction = match key {
            Key::Backspace => Direction::Before,
            Key::Delete => Direction::After,
            _ => return KeyDisposition::Default,
        };
        let (Some(frame), Some(selection)) = (self.surface.frame(), self.surface.selection())
        else {
            return KeyDisposition::Default;
        };
        let tag = self.contract.tag.as_str();
        let selected_node = self.surface.selected_node();

        let target = {
            let realm = frame.borrow();
            let doc = realm.document();
            let direct = selected_node.and_then(|node| widget_at(doc, node, tag));
            if direct.is_some() {
                direct
            } else if selection.is_collapsed() {
                resolve_target(doc, selection.start, direction, tag)
            } else {
                if self.surface.selection_contains_tag(tag) {
                    debug!("event=key_down module=app status=multi_node_delete");
                }
                None
            }
        };

        let Some(node) = target else {
            return KeyDisposition::Default;
        };
        if !self.surface.remove_node(node) {
            return KeyDisposition::Default;
        }
        info!(
            "event=key_down module=app status=widget_removed node={} direction={direction:?}",
            node.index()
        );
        KeyDisposition::PreventDefault { removed: node }
    }

    pub fn editor_key_up(&self, _key: Key) -> Highlight {
        self.highlight_nearby_dropdowns()
    }

    pub fn editor_click(&mut self, position: Position) -> Highlight {
        self.surface
            .set_selection(SelectionRange::collapsed(position));
        self.highlight_nearby_dropdowns()
    }

    /// Marks the widgets Backspace and Delete would remove from the cursor.
    pub fn highlight_nearby_dropdowns(&self) -> Highlight {
        let (Some(frame), Some(selection)) = (self.surface.frame(), self.surface.selection())
        else {
            return Highlight::default();
        };
        let mut realm = frame.borrow_mut();
        let doc = realm.document_mut();
        let highlight = deletable_candidates(doc, selection.start, &self.contract.tag);
        apply_highlight(doc, &self.contract, &highlight);
        highlight
    }
}

impl Drop for TemplateApp {
    fn drop(&mut self) {
        self.surface.events().unsubscribe(self.surface_subscription);
        self.activator.detach();
    }
}
