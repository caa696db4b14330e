use std::ops::Deref;
use std::rc::Rc;

use super::{
    DecodeInput, DecodedDataCache, DecodedPayload, PassthroughDecoder, Payload, PayloadDecoder,
    ResourceFactory, check_loaded,
};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::{Resource, ResourceClient, ResourceType};

/// Decoded image held by an image resource.
pub struct ImagePayload {
    decoder: Rc<dyn PayloadDecoder>,
    image: Option<DecodedPayload>,
}

impl ImagePayload {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self {
            decoder,
            image: None,
        }
    }
}

impl DecodedDataCache for ImagePayload {
    fn decoded_size(&self) -> usize {
        self.image.as_ref().map_or(0, DecodedPayload::size)
    }

    fn has_decoded_data(&self) -> bool {
        self.image.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        self.image = Some(self.decoder.decode(input.data, input.response)?);
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        if encoded_available {
            self.image = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.image = None;
    }

    // Decoders may need the bytes again for animation or re-decoding at a
    // different size.
    fn survives_without_encoded_data(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct ImageResourceFactory {
    decoder: Rc<dyn PayloadDecoder>,
}

impl ImageResourceFactory {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self { decoder }
    }
}

impl Default for ImageResourceFactory {
    fn default() -> Self {
        Self::new(Rc::new(PassthroughDecoder))
    }
}

impl ResourceFactory for ImageResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Image
    }

    fn create_payload(&self) -> Payload {
        Payload::Image(ImagePayload::new(self.decoder.clone()))
    }
}

/// Typed view of an image resource.
#[derive(Debug, Clone)]
pub struct ImageResource(Resource);

impl ImageResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        factory: &ImageResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, factory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::Image).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// The decoded image, re-decoded from the buffered bytes if it was
    /// pruned.
    pub fn image(&self) -> Result<DecodedPayload, RefusalReason> {
        check_loaded(&self.0)?;
        if !self.0.ensure_decoded() {
            return Err(if self.0.error_occurred() {
                RefusalReason::Decode
            } else {
                RefusalReason::NotLoaded
            });
        }
        let image = match &*self.0.payload() {
            Payload::Image(payload) => payload.image.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        image.ok_or(RefusalReason::NotLoaded)
    }
}

impl Deref for ImageResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}
