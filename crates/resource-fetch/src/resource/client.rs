use indexmap::IndexMap;
use std::rc::Rc;

use super::Resource;
use crate::http::{ResourceRequest, ResourceResponse};

/// Observer of a resource.
///
/// Every callback has a no-op default; each resource type only invokes the
/// callbacks that make sense for it. Callbacks may freely add or remove
/// observers on the same resource.
pub trait ResourceClient {
    fn debug_name(&self) -> &str {
        "ResourceClient"
    }

    /// The resource reached a terminal state.
    fn notify_finished(&self, _resource: &Resource) {}

    /// A redirect hop was followed. Raw resource types only.
    fn redirect_received(
        &self,
        _resource: &Resource,
        _request: &ResourceRequest,
        _redirect_response: &ResourceResponse,
    ) {
    }

    /// Raw resource types only.
    fn response_received(&self, _resource: &Resource, _response: &ResourceResponse) {}

    /// Raw resource types only.
    fn data_received(&self, _resource: &Resource, _data: &[u8]) {}

    fn font_load_short_limit_exceeded(&self, _resource: &Resource) {}

    fn font_load_long_limit_exceeded(&self, _resource: &Resource) {}
}

fn client_key(client: &Rc<dyn ResourceClient>) -> usize {
    Rc::as_ptr(client) as *const () as usize
}

/// Insertion-ordered multiset of observers keyed by pointer identity.
#[derive(Default)]
pub(crate) struct ClientSet {
    entries: IndexMap<usize, (Rc<dyn ResourceClient>, usize)>,
}

impl ClientSet {
    pub fn add(&mut self, client: Rc<dyn ResourceClient>) {
        self.add_counted(client, 1);
    }

    pub fn add_counted(&mut self, client: Rc<dyn ResourceClient>, count: usize) {
        let key = client_key(&client);
        self.entries
            .entry(key)
            .and_modify(|(_, existing)| *existing += count)
            .or_insert((client, count));
    }

    /// Drop one registration. Returns true if the client was present.
    pub fn remove_one(&mut self, client: &Rc<dyn ResourceClient>) -> bool {
        let key = client_key(client);
        let Some((_, count)) = self.entries.get_mut(&key) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.entries.shift_remove(&key);
        }
        true
    }

    /// Remove every registration of `client`, returning how many there were.
    pub fn take(&mut self, client: &Rc<dyn ResourceClient>) -> Option<(Rc<dyn ResourceClient>, usize)> {
        self.entries.shift_remove(&client_key(client))
    }

    pub fn contains(&self, client: &Rc<dyn ResourceClient>) -> bool {
        self.entries.contains_key(&client_key(client))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct observers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distinct observers in attachment order.
    pub fn snapshot(&self) -> Vec<Rc<dyn ResourceClient>> {
        self.entries.values().map(|(client, _)| client.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
