use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::Resource;
use crate::scheduler::{Scheduler, TaskHandle};

struct CallbackInner {
    scheduler: Scheduler,
    pending: RefCell<IndexMap<u64, Resource>>,
    task: RefCell<Option<TaskHandle>>,
}

/// Deferred delivery to observers attached after a resource already had a
/// response or error. All pending resources share a single posted task.
#[derive(Clone)]
pub struct ResourceCallback {
    inner: Rc<CallbackInner>,
}

impl ResourceCallback {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(CallbackInner {
                scheduler,
                pending: RefCell::new(IndexMap::new()),
                task: RefCell::new(None),
            }),
        }
    }

    pub fn schedule(&self, resource: &Resource) {
        self.inner
            .pending
            .borrow_mut()
            .insert(resource.id(), resource.clone());
        if self.inner.task.borrow().as_ref().is_some_and(TaskHandle::is_pending) {
            return;
        }
        let weak: Weak<CallbackInner> = Rc::downgrade(&self.inner);
        let handle = self.inner.scheduler.post("resource-callback", move || {
            if let Some(inner) = weak.upgrade() {
                ResourceCallback { inner }.run_task();
            }
        });
        *self.inner.task.borrow_mut() = Some(handle);
    }

    pub fn cancel(&self, resource: &Resource) {
        let now_empty = {
            let mut pending = self.inner.pending.borrow_mut();
            pending.shift_remove(&resource.id());
            pending.is_empty()
        };
        if now_empty && let Some(task) = self.inner.task.borrow_mut().take() {
            task.cancel();
        }
    }

    pub fn is_scheduled(&self, resource: &Resource) -> bool {
        self.inner.pending.borrow().contains_key(&resource.id())
    }

    fn run_task(&self) {
        self.inner.task.borrow_mut().take();
        let resources: Vec<Resource> = self
            .inner
            .pending
            .borrow_mut()
            .drain(..)
            .map(|(_, resource)| resource)
            .collect();
        for resource in resources {
            resource.finish_pending_clients();
        }
    }
}
