use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;

pub const DEFAULT_MAX_TURNS: usize = 1000;

struct Task {
    label: &'static str,
    run: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct Queue {
    tasks: RefCell<VecDeque<Task>>,
    turn: Cell<u64>,
}

/// Cooperative, single-threaded loop for deferred continuations.
///
/// A continuation queued with [`EventLoop::defer`] never runs in the turn that
/// queued it. Continuations must tolerate their target having disappeared.
#[derive(Clone, Default)]
pub struct EventLoop {
    queue: Rc<Queue>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, label: &'static str, task: impl FnOnce() + 'static) {
        self.queue.tasks.borrow_mut().push_back(Task {
            label,
            run: Box::new(task),
        });
    }

    pub fn pending(&self) -> usize {
        self.queue.tasks.borrow().len()
    }

    pub fn turn(&self) -> u64 {
        self.queue.turn.get()
    }

    /// Runs every task that was queued before this turn started and returns how
    /// many ran. Tasks queued while running are left for the next turn.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<Task> = self.queue.tasks.borrow_mut().drain(..).collect();
        self.queue.turn.set(self.queue.turn.get() + 1);
        let count = batch.len();
        for task in batch {
            debug!(
                "event=deferred_task module=event_loop turn={} label={}",
                self.queue.turn.get(),
                task.label
            );
            (task.run)();
        }
        count
    }

    pub fn run_until_idle(&self, max_turns: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_turns.max(1) {
            if self.pending() == 0 {
                break;
            }
            total += self.run_turn();
        }
        total
    }
}
