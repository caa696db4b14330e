use bytes::Bytes;
use std::ops::Deref;
use std::rc::Rc;

use super::{Payload, ResourceFactory};
use crate::error::FetchError;
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::{Resource, ResourceClient, ResourceType};

/// Factory for every byte-stream type: main resources, raw fetches, media,
/// text tracks, manifests, imports and prefetches.
#[derive(Debug, Clone, Copy)]
pub struct RawResourceFactory {
    resource_type: ResourceType,
}

impl RawResourceFactory {
    /// Falls back to [`ResourceType::Raw`] for types with a decoded payload.
    pub fn new(resource_type: ResourceType) -> Self {
        let resource_type = if resource_type.is_raw_family() {
            resource_type
        } else {
            ResourceType::Raw
        };
        Self { resource_type }
    }

    pub fn main_resource() -> Self {
        Self::new(ResourceType::MainResource)
    }

    pub fn media() -> Self {
        Self::new(ResourceType::Media)
    }

    pub fn text_track() -> Self {
        Self::new(ResourceType::TextTrack)
    }

    pub fn manifest() -> Self {
        Self::new(ResourceType::Manifest)
    }

    pub fn import() -> Self {
        Self::new(ResourceType::ImportResource)
    }

    pub fn link_prefetch() -> Self {
        Self::new(ResourceType::LinkPrefetch)
    }
}

impl Default for RawResourceFactory {
    fn default() -> Self {
        Self::new(ResourceType::Raw)
    }
}

impl ResourceFactory for RawResourceFactory {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn create_payload(&self) -> Payload {
        Payload::Raw
    }
}

/// Typed view of a raw resource. Observers get redirect, response and data
/// callbacks; there is no decoded payload.
#[derive(Debug, Clone)]
pub struct RawResource(Resource);

impl RawResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        factory: RawResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, &factory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        resource
            .resource_type()
            .is_raw_family()
            .then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// Whole body received so far.
    pub fn body(&self) -> Bytes {
        self.0.data().unwrap_or_default()
    }
}

impl Deref for RawResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_keeps_raw_family_types() {
        assert_eq!(
            RawResourceFactory::main_resource().resource_type(),
            ResourceType::MainResource
        );
        assert_eq!(
            RawResourceFactory::new(ResourceType::Script).resource_type(),
            ResourceType::Raw
        );
        assert!(matches!(RawResourceFactory::media().create_payload(), Payload::Raw));
    }
}
