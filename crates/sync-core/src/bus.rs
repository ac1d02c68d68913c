use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<E> = Rc<dyn Fn(&E)>;

struct Subscribers<E> {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(SubscriptionId, Handler<E>)>>,
}

/// Synchronous, single-threaded fan-out of events to registered observers.
///
/// `emit` iterates over a snapshot of the subscriber list, so handlers are free
/// to subscribe, unsubscribe, or emit again while being notified.
pub struct EventBus<E> {
    inner: Rc<Subscribers<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(Subscribers {
                next_id: Cell::new(1),
                handlers: RefCell::new(Vec::new()),
            }),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .handlers
            .borrow_mut()
            .push((id, Rc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.inner.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
