//! # Memory Cache
//!
//! Map from [`CacheKey`] to [`Resource`], partitioned by cache identifier.
//!
//! Entries hold a weak reference to their resource. While
//! `retain_unobserved` is set, an entry also keeps a strong handle so a
//! resource outlives its last external owner until a prune lets it go. When
//! the last handle to a resource is dropped, the resource reports back and
//! its entry is removed.
//!
//! Sizes are tracked separately for live resources (with observers) and dead
//! ones. Pruning releases dead resources first, then older decoded data, and
//! never forces a live resource out.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use url::Url;

use super::types::{CacheConfig, CacheKey, CacheStats, PruneStrategy};
use crate::resource::{Resource, WeakResource};
use crate::scheduler::{Scheduler, TaskHandle};

struct CacheEntry {
    resource: WeakResource,
    retained: Option<Resource>,
    id: u64,
    size: usize,
    live: bool,
    last_decoded_access: Option<DateTime<Utc>>,
    access_seq: u64,
}

type Partition = IndexMap<String, CacheEntry>;

struct MemoryCacheInner {
    config: RefCell<CacheConfig>,
    scheduler: Scheduler,
    partitions: RefCell<HashMap<String, Partition>>,
    live_size: Cell<usize>,
    dead_size: Cell<usize>,
    access_seq: Cell<u64>,
    last_prune: Cell<DateTime<Utc>>,
    prune_task: RefCell<Option<TaskHandle>>,
    in_prune: Cell<bool>,
    prune_count: Cell<u64>,
    /// Resources released while the entry map was borrowed.
    released: RefCell<Vec<(CacheKey, u64)>>,
}

/// Shared in-memory resource cache.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Rc<MemoryCacheInner>,
}

/// Non-owning handle held by resources.
#[derive(Clone, Default)]
pub struct WeakMemoryCache {
    inner: Weak<MemoryCacheInner>,
}

impl WeakMemoryCache {
    pub fn upgrade(&self) -> Option<MemoryCache> {
        self.inner.upgrade().map(|inner| MemoryCache { inner })
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("live_size", &self.inner.live_size.get())
            .field("dead_size", &self.inner.dead_size.get())
            .finish()
    }
}

impl MemoryCache {
    pub fn new(config: CacheConfig, scheduler: Scheduler) -> Self {
        debug!(
            capacity = config.capacity,
            retain_unobserved = config.retain_unobserved,
            "Memory cache created"
        );
        let now = scheduler.now();
        Self {
            inner: Rc::new(MemoryCacheInner {
                config: RefCell::new(config),
                scheduler,
                partitions: RefCell::new(HashMap::new()),
                live_size: Cell::new(0),
                dead_size: Cell::new(0),
                access_seq: Cell::new(0),
                last_prune: Cell::new(now),
                prune_task: RefCell::new(None),
                in_prune: Cell::new(false),
                prune_count: Cell::new(0),
                released: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakMemoryCache {
        WeakMemoryCache {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &MemoryCache) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.borrow().capacity
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.inner.config.borrow_mut().capacity = capacity;
        self.prune(None);
    }

    pub fn size(&self) -> usize {
        self.inner.live_size.get() + self.inner.dead_size.get()
    }

    pub fn live_size(&self) -> usize {
        self.inner.live_size.get()
    }

    pub fn dead_size(&self) -> usize {
        self.inner.dead_size.get()
    }

    pub fn len(&self) -> usize {
        self.drain_released();
        self.inner.partitions.borrow().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_access_seq(&self) -> u64 {
        let seq = self.inner.access_seq.get();
        self.inner.access_seq.set(seq + 1);
        seq
    }

    fn account(&self, live: bool, add: usize, sub: usize) {
        let cell = if live {
            &self.inner.live_size
        } else {
            &self.inner.dead_size
        };
        cell.set((cell.get() + add).saturating_sub(sub));
    }

    /// Insert a resource under its identity.
    ///
    /// # Panics
    ///
    /// If a different resource is already cached under the same identity.
    /// Callers remove the old one first.
    pub fn add(&self, resource: &Resource) {
        self.drain_released();
        let key = resource.cache_key();
        let retain = self.inner.config.borrow().retain_unobserved;
        let seq = self.next_access_seq();
        let size = resource.size();
        let live = resource.is_alive();

        let replaced = {
            let mut partitions = self.inner.partitions.borrow_mut();
            let partition = partitions.entry(key.identifier.clone()).or_default();
            if let Some(existing) = partition.get(&key.url) {
                assert!(
                    !existing.resource.can_upgrade(),
                    "memory cache already holds a resource for {key}"
                );
            }
            partition.insert(
                key.url.clone(),
                CacheEntry {
                    resource: resource.downgrade(),
                    retained: retain.then(|| resource.clone()),
                    id: resource.id(),
                    size,
                    live,
                    last_decoded_access: None,
                    access_seq: seq,
                },
            )
        };
        if let Some(stale) = &replaced {
            self.account(stale.live, 0, stale.size);
        }
        self.account(live, size, 0);
        trace!(key = %key, size, "Added resource to memory cache");
        drop(replaced);
        self.prune(None);
    }

    /// The cached resource for `url` in partition `identifier`, if any.
    pub fn lookup(&self, url: &Url, identifier: &str) -> Option<Resource> {
        self.drain_released();
        let key = CacheKey::new(url, identifier);
        self.inner
            .partitions
            .borrow()
            .get(&key.identifier)
            .and_then(|partition| partition.get(&key.url))
            .and_then(|entry| entry.resource.upgrade())
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        self.with_entry(resource, |_| ()).is_some()
    }

    /// Remove a resource's entry. Does nothing if it is not cached.
    pub fn remove(&self, resource: &Resource) {
        let key = resource.cache_key();
        let removed = {
            let mut partitions = self.inner.partitions.borrow_mut();
            let Some(partition) = partitions.get_mut(&key.identifier) else {
                return;
            };
            if partition.get(&key.url).is_none_or(|entry| entry.id != resource.id()) {
                return;
            }
            let removed = partition.shift_remove(&key.url);
            if partition.is_empty() {
                partitions.remove(&key.identifier);
            }
            removed
        };
        if let Some(entry) = &removed {
            self.account(entry.live, 0, entry.size);
            debug!(key = %key, size = entry.size, "Removed resource from memory cache");
        }
        // Any retained handle is dropped here, outside the borrow.
        drop(removed);
    }

    fn with_entry<R>(&self, resource: &Resource, f: impl FnOnce(&mut CacheEntry) -> R) -> Option<R> {
        let key = resource.cache_key();
        let mut partitions = self.inner.partitions.borrow_mut();
        let entry = partitions
            .get_mut(&key.identifier)?
            .get_mut(&key.url)
            .filter(|entry| entry.id == resource.id())?;
        Some(f(entry))
    }

    /// Record a size change of a cached resource.
    pub fn update(&self, resource: &Resource, old_size: usize, new_size: usize) {
        let live = self.with_entry(resource, |entry| {
            entry.size = new_size;
            entry.live
        });
        let Some(live) = live else {
            return;
        };
        self.account(live, new_size, old_size);
        if new_size > old_size {
            self.prune(None);
        }
    }

    /// Move a resource to the most recently used position.
    pub fn update_for_access(&self, resource: &Resource) {
        let seq = self.next_access_seq();
        let key = resource.cache_key();
        let mut partitions = self.inner.partitions.borrow_mut();
        let Some(partition) = partitions.get_mut(&key.identifier) else {
            return;
        };
        if let Some(index) = partition.get_index_of(&key.url)
            && partition[index].id == resource.id()
        {
            let last = partition.len() - 1;
            partition.move_index(index, last);
            partition[last].access_seq = seq;
        }
    }

    /// Stamp the decoded-data access time used by the prune thrash guard.
    pub fn update_decoded_resource(&self, resource: &Resource) {
        let now = self.inner.scheduler.now();
        self.with_entry(resource, |entry| entry.last_decoded_access = Some(now));
        self.update_for_access(resource);
    }

    /// A resource gained its first observer.
    pub fn make_live(&self, resource: &Resource) {
        let retain = self.inner.config.borrow().retain_unobserved;
        let moved = self.with_entry(resource, |entry| {
            if retain && entry.retained.is_none() {
                entry.retained = Some(resource.clone());
            }
            (!entry.live).then(|| {
                entry.live = true;
                entry.size
            })
        });
        if let Some(Some(size)) = moved {
            self.account(false, 0, size);
            self.account(true, size, 0);
        }
    }

    /// A resource lost its last observer.
    pub fn make_dead(&self, resource: &Resource) {
        let moved = self.with_entry(resource, |entry| {
            entry.live.then(|| {
                entry.live = false;
                entry.size
            })
        });
        if let Some(Some(size)) = moved {
            self.account(true, 0, size);
            self.account(false, size, 0);
        }
    }

    /// Called when the last handle to a resource goes away.
    pub(crate) fn resource_released(&self, key: &CacheKey, id: u64) {
        let Ok(mut partitions) = self.inner.partitions.try_borrow_mut() else {
            self.inner.released.borrow_mut().push((key.clone(), id));
            return;
        };
        let removed = Self::remove_released(&mut partitions, key, id);
        drop(partitions);
        if let Some((live, size)) = removed {
            self.account(live, 0, size);
            trace!(key = %key, size, "Released resource left the memory cache");
        }
    }

    fn remove_released(
        partitions: &mut HashMap<String, Partition>,
        key: &CacheKey,
        id: u64,
    ) -> Option<(bool, usize)> {
        let partition = partitions.get_mut(&key.identifier)?;
        let entry = partition.get(&key.url)?;
        if entry.id != id || entry.resource.can_upgrade() {
            return None;
        }
        let entry = partition.shift_remove(&key.url)?;
        if partition.is_empty() {
            partitions.remove(&key.identifier);
        }
        Some((entry.live, entry.size))
    }

    fn drain_released(&self) {
        let released = std::mem::take(&mut *self.inner.released.borrow_mut());
        for (key, id) in released {
            self.resource_released(&key, id);
        }
    }

    /// Request a prune. Runs now, or from a scheduled task when the previous
    /// prune was too recent. `just_released` is a resource that just lost
    /// its last observer.
    pub fn prune(&self, just_released: Option<&Resource>) {
        if self.inner.in_prune.get() {
            return;
        }
        let capacity = self.capacity();
        if self.size() <= capacity {
            return;
        }

        if let Some(resource) = just_released
            && !resource.is_alive()
        {
            resource.prune();
        }

        let now = self.inner.scheduler.now();
        let since_last = now.signed_duration_since(self.inner.last_prune.get());
        let deferral = self.inner.config.borrow().max_prune_deferral_delay;
        if since_last.to_std().unwrap_or_default() >= deferral {
            self.prune_now(PruneStrategy::Automatic);
            return;
        }

        if self
            .inner
            .prune_task
            .borrow()
            .as_ref()
            .is_some_and(TaskHandle::is_pending)
        {
            return;
        }
        let weak = self.downgrade();
        let task = self.inner.scheduler.post("memory-cache-prune", move || {
            if let Some(cache) = weak.upgrade() {
                cache.prune_now(PruneStrategy::Automatic);
            }
        });
        *self.inner.prune_task.borrow_mut() = Some(task);
    }

    /// Release everything that can be released.
    pub fn prune_all(&self) {
        self.prune_now(PruneStrategy::Maximal);
    }

    fn prune_now(&self, strategy: PruneStrategy) {
        if self.inner.in_prune.replace(true) {
            return;
        }
        if let Some(task) = self.inner.prune_task.borrow_mut().take() {
            task.cancel();
        }
        self.drain_released();

        let (target, live_delay) = {
            let config = self.inner.config.borrow();
            let target = match strategy {
                PruneStrategy::Automatic => (config.capacity as u128 * 95 / 100) as usize,
                PruneStrategy::Maximal => 0,
            };
            (target, config.delay_before_live_decoded_prune)
        };
        let now = self.inner.scheduler.now();
        let before = self.size();

        let candidates = self.prune_candidates();
        let mut released = Vec::new();
        // Released handles only leave the accounting once dropped below.
        let mut releasing = 0;
        for (resource, last_access) in &candidates {
            if self.size().saturating_sub(releasing) <= target {
                break;
            }
            if resource.is_alive() {
                let recently_decoded = last_access.is_some_and(|at| {
                    now.signed_duration_since(at).to_std().unwrap_or_default() < live_delay
                });
                if strategy == PruneStrategy::Automatic && recently_decoded {
                    continue;
                }
                resource.prune();
                continue;
            }
            resource.prune();
            let taken = self.with_entry(resource, |entry| {
                entry.retained.take().map(|handle| (handle, entry.size))
            });
            if let Some(Some((handle, size))) = taken {
                releasing += size;
                released.push(handle);
            }
        }

        self.inner.last_prune.set(now);
        self.inner.prune_count.set(self.inner.prune_count.get() + 1);
        self.inner.in_prune.set(false);
        debug!(
            ?strategy,
            before,
            after = self.size(),
            released = released.len(),
            "Pruned memory cache"
        );
        // Dropping the last handles removes their entries.
        drop(released);
        drop(candidates);
    }

    /// Dead resources first, then least recently decoded, then least
    /// recently used.
    fn prune_candidates(&self) -> Vec<(Resource, Option<DateTime<Utc>>)> {
        let mut candidates: Vec<(bool, Option<DateTime<Utc>>, u64, Resource)> = self
            .inner
            .partitions
            .borrow()
            .values()
            .flat_map(|partition| partition.values())
            .filter_map(|entry| {
                let resource = entry.resource.upgrade()?;
                Some((entry.live, entry.last_decoded_access, entry.access_seq, resource))
            })
            .collect();
        candidates.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        candidates
            .into_iter()
            .map(|(_, last_access, _, resource)| (resource, last_access))
            .collect()
    }

    /// Drop every entry.
    pub fn evict_resources(&self) {
        let evicted: Vec<Partition> = self
            .inner
            .partitions
            .borrow_mut()
            .drain()
            .map(|(_, partition)| partition)
            .collect();
        self.inner.live_size.set(0);
        self.inner.dead_size.set(0);
        let count: usize = evicted.iter().map(IndexMap::len).sum();
        debug!(count, "Evicted all resources from memory cache");
        drop(evicted);
    }

    /// Every cached resource that is still reachable.
    pub fn resources(&self) -> Vec<Resource> {
        self.drain_released();
        self.inner
            .partitions
            .borrow()
            .values()
            .flat_map(|partition| partition.values())
            .filter_map(|entry| entry.resource.upgrade())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let resources = self.resources();
        let live_entries = resources.iter().filter(|r| r.is_alive()).count();
        CacheStats {
            entries: resources.len(),
            live_entries,
            dead_entries: resources.len() - live_entries,
            capacity: self.capacity(),
            live_size: self.live_size(),
            dead_size: self.dead_size(),
            encoded_size: resources.iter().map(Resource::encoded_size_memory_usage).sum(),
            decoded_size: resources.iter().map(Resource::decoded_size).sum(),
            prune_count: self.inner.prune_count.get(),
        }
    }
}
