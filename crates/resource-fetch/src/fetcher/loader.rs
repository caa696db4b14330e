use std::rc::Weak;

use super::FetcherInner;
use crate::http::ResourceLoadPriority;

/// Handle from a resource back to the loader serving it.
///
/// Holds the fetcher weakly; once the fetcher is gone every call is a no-op.
#[derive(Clone)]
pub(crate) struct LoaderRef {
    id: u64,
    fetcher: Weak<FetcherInner>,
}

impl LoaderRef {
    pub(super) fn new(id: u64, fetcher: Weak<FetcherInner>) -> Self {
        Self { id, fetcher }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the load and fail the resource with a cancellation.
    pub fn cancel(&self) {
        if let Some(fetcher) = self.fetcher.upgrade() {
            fetcher.cancel_loader(self.id);
        }
    }

    pub fn did_change_priority(&self, priority: ResourceLoadPriority) {
        if let Some(fetcher) = self.fetcher.upgrade() {
            fetcher.set_loader_priority(self.id, priority);
        }
    }
}

impl std::fmt::Debug for LoaderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRef").field("id", &self.id).finish()
    }
}
