use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Wake, Waker};

const ERR_POISONED_LOCK: &str = "ready queue lock should never be poisoned - nothing panics while holding it";

pub(crate) type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct TaskId(u64);

impl TaskId {
    /// The future passed to `block_on()`, which is not stored in the task set.
    pub(crate) const MAIN: Self = Self(0);
}

/// Tasks that have been woken and are waiting to be polled.
///
/// Wakers may be sent to other threads, so this is the one thread-safe part of the runtime.
/// An id may be queued more than once, or after its task completed; both are harmless.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    pub(crate) fn push(&self, id: TaskId) {
        self.ids.lock().expect(ERR_POISONED_LOCK).push_back(id);
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        self.ids.lock().expect(ERR_POISONED_LOCK).pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.lock().expect(ERR_POISONED_LOCK).is_empty()
    }
}

struct TaskWaker {
    id: TaskId,
    queue: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.id);
    }
}

pub(crate) fn waker_for(id: TaskId, queue: &Arc<ReadyQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker {
        id,
        queue: Arc::clone(queue),
    }))
}

pub(crate) struct Task {
    pub(crate) future: LocalFuture,
    pub(crate) waker: Waker,
}

/// Spawned tasks that are not currently being polled.
///
/// A task is taken out while it is polled, so that it can spawn more tasks into the set.
#[derive(Default)]
pub(crate) struct TaskSet {
    last_id: u64,
    tasks: HashMap<TaskId, Task>,
}

impl TaskSet {
    pub(crate) fn insert(&mut self, future: LocalFuture, queue: &Arc<ReadyQueue>) -> TaskId {
        self.last_id = self
            .last_id
            .checked_add(1)
            .expect("task id space exhausted - this indicates an unrealistic scenario");
        let id = TaskId(self.last_id);

        self.tasks.insert(
            id,
            Task {
                future,
                waker: waker_for(id, queue),
            },
        );

        id
    }

    pub(crate) fn take(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub(crate) fn put_back(&mut self, id: TaskId, task: Task) {
        self.tasks.insert(id, task);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain().map(|(_, task)| task).collect()
    }
}
