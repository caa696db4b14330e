//! # Transport Boundary
//!
//! The engine never talks to the network itself. A [`Transport`] is handed a
//! request and a [`LoaderSink`]; it reports progress by pushing
//! [`LoaderEvent`]s into the sink, and the fetcher applies them to the
//! resource the next time it drains its queue.
//!
//! Events for a load are expected in the order
//! `Redirect* Response Data* (Finish | Fail)`, or a bare `Fail`.

use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::Notify;

use crate::error::ResourceError;
use crate::http::{ResourceLoadPriority, ResourceRequest, ResourceResponse};

mod reqwest_transport;

pub use reqwest_transport::{ReqwestTransport, TransportConfig, TransportConfigBuilder};

/// Progress of one load.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// A redirect is being followed; `request` is the next hop.
    Redirect {
        request: ResourceRequest,
        response: ResourceResponse,
    },
    Response(ResourceResponse),
    Data(Bytes),
    Finish,
    Fail(ResourceError),
}

impl LoaderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LoaderEvent::Redirect { .. } => "redirect",
            LoaderEvent::Response(_) => "response",
            LoaderEvent::Data(_) => "data",
            LoaderEvent::Finish => "finish",
            LoaderEvent::Fail(_) => "fail",
        }
    }
}

struct QueueInner {
    events: RefCell<VecDeque<(u64, LoaderEvent)>>,
    notify: Notify,
}

/// FIFO of events from every load started by one fetcher.
#[derive(Clone)]
pub struct LoaderEventQueue {
    inner: Rc<QueueInner>,
}

impl Default for LoaderEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderEventQueue {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(QueueInner {
                events: RefCell::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn sink(&self, loader_id: u64) -> LoaderSink {
        LoaderSink {
            loader_id,
            queue: self.clone(),
        }
    }

    pub fn push(&self, loader_id: u64, event: LoaderEvent) {
        self.inner.events.borrow_mut().push_back((loader_id, event));
        self.inner.notify.notify_one();
    }

    pub fn pop(&self) -> Option<(u64, LoaderEvent)> {
        self.inner.events.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.events.borrow().is_empty()
    }

    /// Resolves once an event has been pushed since the last wait.
    pub async fn wait(&self) {
        if !self.is_empty() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// Where a transport reports progress for a single load.
#[derive(Clone)]
pub struct LoaderSink {
    loader_id: u64,
    queue: LoaderEventQueue,
}

impl LoaderSink {
    pub fn loader_id(&self) -> u64 {
        self.loader_id
    }

    pub fn send(&self, event: LoaderEvent) {
        self.queue.push(self.loader_id, event);
    }

    pub fn redirect(&self, request: ResourceRequest, response: ResourceResponse) {
        self.send(LoaderEvent::Redirect { request, response });
    }

    pub fn response(&self, response: ResourceResponse) {
        self.send(LoaderEvent::Response(response));
    }

    pub fn data(&self, data: impl Into<Bytes>) {
        self.send(LoaderEvent::Data(data.into()));
    }

    pub fn finish(&self) {
        self.send(LoaderEvent::Finish);
    }

    pub fn fail(&self, error: ResourceError) {
        self.send(LoaderEvent::Fail(error));
    }
}

/// Starts loads on behalf of a fetcher.
pub trait Transport {
    fn start(&self, request: &ResourceRequest, sink: LoaderSink) -> Box<dyn TransportHandle>;
}

/// Control over a started load.
pub trait TransportHandle {
    /// Stop the load. No further events are reported after this returns.
    fn cancel(&self);

    fn set_priority(&self, _priority: ResourceLoadPriority) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_sink_preserves_order_per_loader() {
        let queue = LoaderEventQueue::new();
        let a = queue.sink(1);
        let b = queue.sink(2);
        let url = Url::parse("https://example.com/").unwrap();

        a.data(Bytes::from_static(b"x"));
        b.fail(ResourceError::cancelled(&url));
        a.finish();

        let order: Vec<(u64, &str)> = std::iter::from_fn(|| queue.pop())
            .map(|(id, event)| (id, event.name()))
            .collect();
        assert_eq!(order, vec![(1, "data"), (2, "fail"), (1, "finish")]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_wait_returns_when_events_are_queued() {
        let queue = LoaderEventQueue::new();
        queue.sink(7).finish();
        queue.wait().await;
        assert_eq!(queue.len(), 1);
    }
}
