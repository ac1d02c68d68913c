use std::cell::RefCell;
use std::rc::Rc;

use template_sync_core::{
    Activator, EventLoop, FramePort, FrameSlot, HostDropdownDefinition, HostPort, RealmHandle,
    RefreshReport, SyncConfig, TemplateId, TemplateRegistry, WidgetContract,
};

const WIDGET: &str = r#"<custom-dropdown selected-value="2"></custom-dropdown>"#;

struct Fixture {
    registry: TemplateRegistry,
    scheduler: EventLoop,
    host: RealmHandle,
    slot: FrameSlot,
    activator: Rc<Activator>,
}

fn fixture() -> Fixture {
    let contract = Rc::new(WidgetContract::default());
    let registry = TemplateRegistry::with_seed(SyncConfig::default().seed_templates);
    let scheduler = EventLoop::new();
    let host = RealmHandle::host(registry.clone(), scheduler.clone());
    host.define(Rc::new(HostDropdownDefinition::new(
        contract.clone(),
        registry.clone(),
    )));
    let slot: FrameSlot = Rc::new(RefCell::new(None));
    let activator = Activator::new(
        contract,
        registry.clone(),
        host.clone(),
        slot.clone(),
        scheduler.clone(),
    );
    activator.attach();
    Fixture {
        registry,
        scheduler,
        host,
        slot,
        activator,
    }
}

fn open_frame(fx: &Fixture) -> RealmHandle {
    let port = FramePort::new();
    HostPort::new(fx.registry.clone()).connect(&port);
    let frame = RealmHandle::frame(port, fx.scheduler.clone());
    frame.set_ready(true);
    *fx.slot.borrow_mut() = Some(frame.clone());
    frame
}

#[test]
fn activation_without_frame_is_skipped() {
    let fx = fixture();
    let report = fx.activator.activate_custom_dropdowns();
    assert!(!report.ran);

    let frame = open_frame(&fx);
    frame.set_ready(false);
    assert!(!fx.activator.activate_custom_dropdowns().ran);
    assert!(!frame.is_defined("custom-dropdown"));
}

#[test]
fn registry_changes_before_frame_is_ready_reach_host_only() {
    let fx = fixture();
    let body = fx.host.borrow().document().body();
    let host_node = fx.host.append_markup(body, WIDGET).unwrap()[0];
    let host_only = RefreshReport {
        host: 1,
        frame: 0,
        activated: false,
    };

    // No frame yet.
    let added = fx.registry.add("template");
    assert!(fx.registry.rename(&added.id, "renamed"));
    fx.registry.select(&TemplateId::from("2"));
    assert!(fx.registry.remove_selected().is_some());
    let view = fx.host.view(host_node).unwrap();
    assert!(view.error);
    assert_eq!(view.labels(), vec!["template 1", "template 3", "renamed"]);
    assert_eq!(fx.activator.refresh_all_dropdowns(), host_only);
    fx.scheduler.run_until_idle(10);

    // Frame exists but is still loading.
    let frame = open_frame(&fx);
    frame.set_ready(false);
    frame
        .replace_content(r#"<custom-dropdown selected-value="1"></custom-dropdown>"#)
        .unwrap();
    let late = fx.registry.add("late");
    assert!(fx.registry.rename(&late.id, "later"));
    assert_eq!(fx.host.view(host_node).unwrap().labels().last(), Some(&"later"));
    assert_eq!(fx.registry.remove_selected(), Some(late.id));
    assert_eq!(fx.activator.refresh_all_dropdowns(), host_only);
    fx.scheduler.run_until_idle(10);
    assert!(!frame.is_defined("custom-dropdown"));
    assert_eq!(frame.pending_elements("custom-dropdown").len(), 1);

    // Frame widgets catch up on the next activation.
    frame.set_ready(true);
    let report = fx.activator.activate_custom_dropdowns();
    assert!(report.ran && report.injected);
    assert_eq!(report.upgraded, 1);
    let frame_node = frame.instance_nodes()[0];
    let view = frame.view(frame_node).unwrap();
    assert!(!view.error);
    assert_eq!(view.labels(), vec!["template 1", "template 3", "renamed"]);
    assert_eq!(
        view.selected_option().map(|o| o.label.as_str()),
        Some("template 1")
    );
}

#[test]
fn activation_injects_definition_once() {
    let fx = fixture();
    let frame = open_frame(&fx);
    frame.replace_content(WIDGET).unwrap();

    let report = fx.activator.activate_custom_dropdowns();
    assert!(report.ran);
    assert!(report.injected);
    assert_eq!(report.upgraded, 1);
    assert_eq!(report.refreshed, 1);

    let report = fx.activator.activate_custom_dropdowns();
    assert!(!report.injected);
    assert_eq!(report.upgraded, 0);
    assert_eq!(report.refreshed, 1);
}

#[test]
fn content_replacement_needs_reactivation() {
    let fx = fixture();
    let frame = open_frame(&fx);
    frame.replace_content(WIDGET).unwrap();
    fx.activator.activate_custom_dropdowns();

    let nodes = frame.replace_content(&format!("{WIDGET}{WIDGET}")).unwrap();
    assert!(nodes.iter().all(|node| !frame.is_upgraded(*node)));

    let report = fx.activator.activate_custom_dropdowns();
    assert!(!report.injected);
    assert_eq!(report.upgraded, 2);
    assert!(nodes.iter().all(|node| frame.is_upgraded(*node)));
}

#[test]
fn reloaded_frame_gets_definition_again() {
    let fx = fixture();
    let frame = open_frame(&fx);
    fx.activator.activate_custom_dropdowns();
    assert!(frame.is_defined("custom-dropdown"));

    frame.reset();
    frame.replace_content(WIDGET).unwrap();
    let report = fx.activator.activate_custom_dropdowns();
    assert!(report.injected);
    assert_eq!(report.upgraded, 1);
}

#[test]
fn registry_changes_reach_both_realms() {
    let fx = fixture();
    let frame = open_frame(&fx);
    let body = fx.host.borrow().document().body();
    let host_node = fx.host.append_markup(body, WIDGET).unwrap()[0];
    frame.replace_content(WIDGET).unwrap();
    fx.activator.activate_custom_dropdowns();
    let frame_node = frame.instance_nodes()[0];

    fx.registry.select(&TemplateId::from("2"));
    fx.registry.rename(&TemplateId::from("2"), "X");

    for view in [fx.host.view(host_node), frame.view(frame_node)] {
        let view = view.unwrap();
        assert!(!view.error);
        assert_eq!(view.selected_option().map(|o| o.label.as_str()), Some("X"));
    }
}

#[test]
fn refresh_activates_pending_frame_widgets() {
    let fx = fixture();
    let frame = open_frame(&fx);
    frame.replace_content(WIDGET).unwrap();

    let report = fx.activator.refresh_all_dropdowns();
    assert!(report.activated);
    assert_eq!(frame.instance_nodes().len(), 1);

    let report = fx.activator.refresh_all_dropdowns();
    assert!(!report.activated);
    assert_eq!(report.frame, 1);
}

#[test]
fn removal_schedules_reactivation() {
    let fx = fixture();
    let frame = open_frame(&fx);
    frame.replace_content(WIDGET).unwrap();
    fx.activator.activate_custom_dropdowns();
    let node = frame.instance_nodes()[0];

    fx.registry.select(&TemplateId::from("2"));
    fx.registry.remove_selected();
    assert!(frame.view(node).unwrap().error);
    assert!(fx.scheduler.pending() > 0);

    fx.scheduler.run_until_idle(10);
    let view = frame.view(node).unwrap();
    assert!(view.error);
    assert_eq!(frame.selected_value(node).as_deref(), Some("2"));
}

#[test]
fn detached_activator_ignores_registry() {
    let fx = fixture();
    let frame = open_frame(&fx);
    frame.replace_content(WIDGET).unwrap();
    fx.activator.activate_custom_dropdowns();
    let node = frame.instance_nodes()[0];

    fx.activator.detach();
    fx.registry.select(&TemplateId::from("2"));
    fx.registry.remove_selected();
    assert!(!frame.view(node).unwrap().error);

    fx.activator.refresh_all_dropdowns();
    assert!(frame.view(node).unwrap().error);
}
