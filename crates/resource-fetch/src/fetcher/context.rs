use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use url::Url;

use crate::http::CacheMode;
use crate::resource::{Resource, ResourceType};

/// The loading context a fetcher works for.
///
/// Every method has a permissive default so embedders only override what
/// they care about.
pub trait FetchContext {
    /// Permission check run before a request is served and again for every
    /// redirect hop. `Err` carries the reason shown in logs.
    fn can_request(
        &self,
        _resource_type: ResourceType,
        _url: &Url,
        _for_preload: bool,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Last chance to refuse a network load after the policy decided one is
    /// needed.
    fn should_load_new_resource(&self, _resource_type: ResourceType) -> bool {
        true
    }

    /// Whether the context's load event has fired.
    fn is_load_complete(&self) -> bool {
        false
    }

    /// Cache mode applied to requests that do not set their own.
    fn cache_mode(&self) -> CacheMode {
        CacheMode::Default
    }

    /// Memory cache partition for this context.
    fn cache_identifier(&self) -> String {
        String::new()
    }

    fn is_detached(&self) -> bool {
        false
    }

    fn did_load_resource(&self, _resource: &Resource) {}
}

/// Context that allows everything, with a few knobs for embedders and tests.
#[derive(Debug, Default)]
pub struct DefaultFetchContext {
    cache_mode: Cell<CacheMode>,
    cache_identifier: RefCell<String>,
    load_complete: Cell<bool>,
    detached: Cell<bool>,
    refuse_new_loads: Cell<bool>,
    blocked_hosts: RefCell<HashSet<String>>,
    loaded: Cell<usize>,
}

impl DefaultFetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cache_mode(&self, mode: CacheMode) {
        self.cache_mode.set(mode);
    }

    pub fn set_cache_identifier(&self, identifier: impl Into<String>) {
        *self.cache_identifier.borrow_mut() = identifier.into();
    }

    pub fn set_load_complete(&self, complete: bool) {
        self.load_complete.set(complete);
    }

    pub fn set_detached(&self, detached: bool) {
        self.detached.set(detached);
    }

    pub fn set_refuse_new_loads(&self, refuse: bool) {
        self.refuse_new_loads.set(refuse);
    }

    /// Refuse every request to `host`, including redirect hops.
    pub fn block_host(&self, host: impl Into<String>) {
        self.blocked_hosts.borrow_mut().insert(host.into());
    }

    /// Number of loads reported finished.
    pub fn loaded_count(&self) -> usize {
        self.loaded.get()
    }
}

impl FetchContext for DefaultFetchContext {
    fn can_request(
        &self,
        _resource_type: ResourceType,
        url: &Url,
        _for_preload: bool,
    ) -> Result<(), String> {
        match url.host_str() {
            Some(host) if self.blocked_hosts.borrow().contains(host) => {
                Err(format!("host '{host}' is blocked"))
            }
            _ => Ok(()),
        }
    }

    fn should_load_new_resource(&self, _resource_type: ResourceType) -> bool {
        !self.refuse_new_loads.get()
    }

    fn is_load_complete(&self) -> bool {
        self.load_complete.get()
    }

    fn cache_mode(&self) -> CacheMode {
        self.cache_mode.get()
    }

    fn cache_identifier(&self) -> String {
        self.cache_identifier.borrow().clone()
    }

    fn is_detached(&self) -> bool {
        self.detached.get()
    }

    fn did_load_resource(&self, _resource: &Resource) {
        self.loaded.set(self.loaded.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_host() {
        let context = DefaultFetchContext::new();
        let allowed = Url::parse("https://example.com/a.js").unwrap();
        let blocked = Url::parse("https://ads.example.net/track.js").unwrap();
        context.block_host("ads.example.net");

        assert!(context.can_request(ResourceType::Script, &allowed, false).is_ok());
        let reason = context
            .can_request(ResourceType::Script, &blocked, false)
            .unwrap_err();
        assert!(reason.contains("ads.example.net"));
    }
}
