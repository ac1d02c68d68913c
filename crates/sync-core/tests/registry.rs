use std::cell::RefCell;
use std::rc::Rc;

use template_sync_core::{RegistryEvent, SyncConfig, Template, TemplateId, TemplateRegistry};

fn seeded() -> TemplateRegistry {
    TemplateRegistry::with_seed(SyncConfig::default().seed_templates)
}

fn record_events(registry: &TemplateRegistry) -> Rc<RefCell<Vec<RegistryEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    registry.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

fn names(registry: &TemplateRegistry) -> Vec<String> {
    registry.list().into_iter().map(|t| t.name).collect()
}

#[test]
fn seed_keeps_insertion_order() {
    let registry = seeded();
    assert_eq!(names(&registry), vec!["template 1", "template 2", "template 3"]);
    assert_eq!(
        registry.get_by_id(&TemplateId::from("2")),
        Some(Template::new("2", "template 2"))
    );
    assert!(registry.selected().is_none());
}

#[test]
fn add_selects_and_notifies() {
    let registry = seeded();
    let events = record_events(&registry);

    let added = registry.add("template");
    assert_eq!(added.id, TemplateId::from("4"));
    assert_eq!(registry.selected(), Some(added.clone()));
    assert_eq!(
        *events.borrow(),
        vec![
            RegistryEvent::SelectionChanged {
                id: Some(added.id.clone())
            },
            RegistryEvent::Changed,
        ]
    );
}

#[test]
fn ids_are_never_reused_after_removal() {
    let registry = seeded();
    let mut issued: Vec<u64> = registry.list().iter().filter_map(|t| t.id.seq()).collect();

    for _ in 0..3 {
        let added = registry.add("template");
        let seq = added.id.seq().unwrap();
        assert!(issued.iter().all(|prev| *prev < seq));
        issued.push(seq);
        assert_eq!(registry.remove_selected(), Some(added.id));
    }

    registry.select(&TemplateId::from("3"));
    registry.remove_selected();
    let added = registry.add("again");
    assert_eq!(added.id, TemplateId::from("7"));
}

#[test]
fn largest_seed_id_does_not_exhaust_the_generator() {
    let max = u64::MAX.to_string();
    let registry = TemplateRegistry::with_seed(vec![Template::new(max.as_str(), "edge")]);
    assert_eq!(registry.add("first").id, TemplateId::from("1"));

    let registry = TemplateRegistry::with_seed(vec![
        Template::new(max.as_str(), "edge"),
        Template::new("5", "five"),
        Template::new("custom", "named"),
    ]);
    assert_eq!(registry.add("next").id, TemplateId::from("6"));
    assert_eq!(registry.len(), 4);
}

#[test]
fn remove_requires_matching_selection() {
    let registry = seeded();
    let events = record_events(&registry);

    assert!(!registry.remove(&TemplateId::from("2")));
    registry.select(&TemplateId::from("1"));
    assert!(!registry.remove(&TemplateId::from("2")));
    assert_eq!(registry.len(), 3);

    events.borrow_mut().clear();
    assert!(registry.remove(&TemplateId::from("1")));
    assert_eq!(
        *events.borrow(),
        vec![
            RegistryEvent::SelectionChanged { id: None },
            RegistryEvent::Changed,
            RegistryEvent::Removed {
                id: TemplateId::from("1")
            },
        ]
    );
}

#[test]
fn removing_selected_clears_selection_and_keeps_order() {
    let registry = seeded();
    registry.select(&TemplateId::from("2"));
    assert_eq!(registry.remove_selected(), Some(TemplateId::from("2")));
    assert!(registry.selected().is_none());
    assert_eq!(names(&registry), vec!["template 1", "template 3"]);
    assert_eq!(registry.remove_selected(), None);
}

#[test]
fn rename_only_touches_selected_record() {
    let registry = seeded();
    let events = record_events(&registry);

    assert!(!registry.rename(&TemplateId::from("2"), "X"));
    assert!(events.borrow().is_empty());

    registry.select(&TemplateId::from("2"));
    assert!(!registry.rename(&TemplateId::from("1"), "X"));
    assert!(registry.rename(&TemplateId::from("2"), "  X  "));
    assert_eq!(registry.get_by_id(&TemplateId::from("2")).unwrap().name, "X");
    assert_eq!(events.borrow().last(), Some(&RegistryEvent::Changed));
}

#[test]
fn blank_rename_is_discarded() {
    let registry = seeded();
    registry.select(&TemplateId::from("3"));
    let events = record_events(&registry);

    assert!(!registry.rename(&TemplateId::from("3"), "   "));
    assert_eq!(registry.get_by_id(&TemplateId::from("3")).unwrap().name, "template 3");
    assert!(events.borrow().is_empty());
}

#[test]
fn selecting_unknown_id_deselects() {
    let registry = seeded();
    registry.select(&TemplateId::from("1"));
    assert!(registry.select(&TemplateId::from("missing")).is_none());
    assert!(registry.selected().is_none());
}

#[test]
fn list_is_a_snapshot() {
    let registry = seeded();
    let mut snapshot = registry.list();
    snapshot.clear();
    assert_eq!(registry.len(), 3);
}

#[test]
fn subscribers_can_read_during_notification() {
    let registry = seeded();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let reader = registry.clone();
    let sink = seen.clone();
    registry.subscribe(move |event| {
        if *event == RegistryEvent::Changed {
            sink.borrow_mut().push(reader.len());
        }
    });

    registry.add("template");
    assert_eq!(*seen.borrow(), vec![4]);
}

#[test]
fn unsubscribed_handlers_stop_receiving() {
    let registry = seeded();
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    let id = registry.subscribe(move |_| *sink.borrow_mut() += 1);
    registry.add("a");
    assert!(registry.unsubscribe(id));
    registry.add("b");
    assert_eq!(*count.borrow(), 2);
}
