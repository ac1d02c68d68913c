use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::bus::SubscriptionId;
use crate::event_loop::EventLoop;
use crate::realm::RealmHandle;
use crate::registry::{RegistryEvent, TemplateRegistry};
use crate::widget::{DefinitionScript, WidgetContract};

/// Where the embedded frame's realm shows up once the editor has created it.
pub type FrameSlot = Rc<RefCell<Option<RealmHandle>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// False when the frame was missing or not ready.
    pub ran: bool,
    pub injected: bool,
    pub upgraded: usize,
    pub refreshed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub host: usize,
    pub frame: usize,
    pub activated: bool,
}

/// Keeps widget populations in both realms defined, upgraded and current.
pub struct Activator {
    contract: Rc<WidgetContract>,
    registry: TemplateRegistry,
    host: RealmHandle,
    frame: FrameSlot,
    scheduler: EventLoop,
    subscription: Cell<Option<SubscriptionId>>,
    self_ref: Weak<Activator>,
}

impl Activator {
    pub fn new(
        contract: Rc<WidgetContract>,
        registry: TemplateRegistry,
        host: RealmHandle,
        frame: FrameSlot,
        scheduler: EventLoop,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            contract,
            registry,
            host,
            frame,
            scheduler,
            subscription: Cell::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Subscribes to registry notifications. Idempotent.
    pub fn attach(&self) {
        if self.subscription.get().is_some() {
            return;
        }
        let this = self.self_ref.clone();
        let id = self.registry.subscribe(move |event| {
            if let Some(this) = this.upgrade() {
                this.on_registry_event(event);
            }
        });
        self.subscription.set(Some(id));
    }

    pub fn detach(&self) {
        if let Some(id) = self.subscription.take() {
            self.registry.unsubscribe(id);
        }
    }

    pub fn frame_slot(&self) -> &FrameSlot {
        &self.frame
    }

    fn ready_frame(&self) -> Option<RealmHandle> {
        let frame = self.frame.borrow().clone()?;
        frame.is_ready().then_some(frame)
    }

    fn on_registry_event(&self, event: &RegistryEvent) {
        match event {
            RegistryEvent::Changed => {
                self.refresh_all_dropdowns();
            }
            RegistryEvent::Removed { id } => {
                debug!("event=template_removed module=activator id={id}");
                self.schedule_refresh_and_activation("template-removed");
            }
            RegistryEvent::SelectionChanged { .. } => {}
        }
    }

    /// Defines the widget inside the frame if the frame lost (or never had)
    /// the definition, then upgrades and refreshes every widget there.
    pub fn activate_custom_dropdowns(&self) -> ActivationReport {
        let Some(frame) = self.ready_frame() else {
            debug!("event=activate module=activator status=skipped reason=frame_not_ready");
            return ActivationReport::default();
        };

        let mut report = ActivationReport {
            ran: true,
            ..ActivationReport::default()
        };
        let pending_before = frame.pending_elements(&self.contract.tag).len();

        if !frame.is_defined(&self.contract.tag) {
            debug!(
                "event=activate module=activator status=injecting tag={}",
                self.contract.tag
            );
            let outcome = DefinitionScript::selector_widget(&self.contract)
                .to_source()
                .and_then(|source| frame.execute_script(&source));
            match outcome {
                Ok(injected) => report.injected = injected,
                Err(err) => {
                    warn!("event=activate module=activator status=script_failed reason={err}");
                }
            }
        }

        // Defining upgrades on its own, so count what is no longer pending.
        frame.upgrade();
        report.upgraded =
            pending_before.saturating_sub(frame.pending_elements(&self.contract.tag).len());
        report.refreshed = frame.refresh_all();
        debug!(
            "event=activate module=activator status=ok injected={} upgraded={} refreshed={}",
            report.injected, report.upgraded, report.refreshed
        );
        report
    }

    /// Refreshes every live widget in the host realm and, when it is ready,
    /// in the frame. Plain widget tags left in the frame trigger activation.
    pub fn refresh_all_dropdowns(&self) -> RefreshReport {
        let mut report = RefreshReport {
            host: self.host.refresh_all(),
            ..RefreshReport::default()
        };

        if let Some(frame) = self.ready_frame() {
            report.frame = frame.refresh_all();
            if !frame.pending_elements(&self.contract.tag).is_empty() {
                debug!("event=refresh_all module=activator status=pending_widgets");
                let activation = self.activate_custom_dropdowns();
                report.activated = activation.ran;
            }
        }

        debug!(
            "event=refresh_all module=activator host={} frame={} activated={}",
            report.host, report.frame, report.activated
        );
        report
    }

    /// Activation on the next turn, once the editor has settled.
    pub fn schedule_activation(&self, label: &'static str) {
        let this = self.self_ref.clone();
        self.scheduler.defer(label, move || {
            if let Some(this) = this.upgrade() {
                this.activate_custom_dropdowns();
            }
        });
    }

    pub fn schedule_refresh_and_activation(&self, label: &'static str) {
        let this = self.self_ref.clone();
        self.scheduler.defer(label, move || {
            if let Some(this) = this.upgrade() {
                this.activate_custom_dropdowns();
                this.refresh_all_dropdowns();
            }
        });
    }
}

impl Drop for Activator {
    fn drop(&mut self) {
        self.detach();
    }
}
