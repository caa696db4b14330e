use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;

use super::mime::is_svg_document_mime_type;
use super::{
    DecodeInput, DecodedDataCache, DecodedPayload, PassthroughDecoder, Payload, PayloadDecoder,
    ResourceFactory, check_loaded,
};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::{Resource, ResourceClient, ResourceType};

/// Decoded SVG document. Responses outside the document MIME allow-list are
/// never handed to the decoder.
pub struct DocumentPayload {
    decoder: Rc<dyn PayloadDecoder>,
    document: Option<DecodedPayload>,
}

impl DocumentPayload {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self {
            decoder,
            document: None,
        }
    }
}

impl DecodedDataCache for DocumentPayload {
    fn decoded_size(&self) -> usize {
        self.document.as_ref().map_or(0, DecodedPayload::size)
    }

    fn has_decoded_data(&self) -> bool {
        self.document.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        if !is_svg_document_mime_type(input.response.mime_type()) {
            return Ok(());
        }
        self.document = Some(self.decoder.decode(input.data, input.response)?);
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        if encoded_available {
            self.document = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.document = None;
    }

    fn survives_without_encoded_data(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct DocumentResourceFactory {
    decoder: Rc<dyn PayloadDecoder>,
}

impl DocumentResourceFactory {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self { decoder }
    }
}

impl Default for DocumentResourceFactory {
    fn default() -> Self {
        Self::new(Rc::new(PassthroughDecoder))
    }
}

impl ResourceFactory for DocumentResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::SvgDocument
    }

    fn create_payload(&self) -> Payload {
        Payload::Document(DocumentPayload::new(self.decoder.clone()))
    }
}

/// Typed view of an SVG document resource.
#[derive(Debug, Clone)]
pub struct DocumentResource(Resource);

impl DocumentResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        factory: &DocumentResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, factory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::SvgDocument).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    pub fn document(&self) -> Result<DecodedPayload, RefusalReason> {
        check_loaded(&self.0)?;
        let mime_type = self
            .0
            .response()
            .map(|r| r.mime_type().to_string())
            .unwrap_or_default();
        if !is_svg_document_mime_type(&mime_type) {
            warn!(url = %self.0.url(), mime_type, "Refused to use document");
            return Err(RefusalReason::MimeType(mime_type));
        }
        if !self.0.ensure_decoded() {
            return Err(if self.0.error_occurred() {
                RefusalReason::Decode
            } else {
                RefusalReason::NotLoaded
            });
        }
        let document = match &*self.0.payload() {
            Payload::Document(payload) => payload.document.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        document.ok_or(RefusalReason::NotLoaded)
    }
}

impl Deref for DocumentResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}
