use std::cell::RefCell;
use std::rc::Rc;

use template_sync_core::{EventBus, EventLoop};

#[test]
fn deferred_tasks_wait_for_next_turn() {
    let scheduler = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    let inner = scheduler.clone();
    scheduler.defer("outer", move || {
        sink.borrow_mut().push("outer");
        let sink = sink.clone();
        inner.defer("inner", move || sink.borrow_mut().push("inner"));
    });

    assert!(log.borrow().is_empty());
    assert_eq!(scheduler.run_turn(), 1);
    assert_eq!(*log.borrow(), vec!["outer"]);
    assert_eq!(scheduler.pending(), 1);

    assert_eq!(scheduler.run_until_idle(10), 1);
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    assert_eq!(scheduler.turn(), 2);
}

#[test]
fn run_until_idle_respects_turn_limit() {
    fn reschedule(scheduler: EventLoop) {
        let next = scheduler.clone();
        scheduler.defer("forever", move || reschedule(next));
    }
    let scheduler = EventLoop::new();
    reschedule(scheduler.clone());
    assert_eq!(scheduler.run_until_idle(5), 5);
    assert_eq!(scheduler.pending(), 1);
}

#[test]
fn bus_delivers_in_subscription_order() {
    let bus: EventBus<u32> = EventBus::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    let first = bus.subscribe(move |n| sink.borrow_mut().push(("first", *n)));
    let sink = seen.clone();
    bus.subscribe(move |n| sink.borrow_mut().push(("second", *n)));
    assert_eq!(bus.len(), 2);

    bus.emit(&1);
    assert!(bus.unsubscribe(first));
    assert!(!bus.unsubscribe(first));
    bus.emit(&2);
    assert_eq!(
        *seen.borrow(),
        vec![("first", 1), ("second", 1), ("second", 2)]
    );
}

#[test]
fn handlers_may_unsubscribe_while_notified() {
    let bus: EventBus<()> = EventBus::new();
    let count = Rc::new(RefCell::new(0));
    let id = Rc::new(RefCell::new(None));

    let sink = count.clone();
    let own_id = id.clone();
    let handle = bus.clone();
    let subscription = bus.subscribe(move |_| {
        *sink.borrow_mut() += 1;
        if let Some(id) = own_id.borrow_mut().take() {
            handle.unsubscribe(id);
        }
    });
    *id.borrow_mut() = Some(subscription);

    bus.emit(&());
    bus.emit(&());
    assert_eq!(*count.borrow(), 1);
    assert!(bus.is_empty());
}
