use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;

use super::mime::is_xsl_mime_type;
use super::{DecodeInput, DecodedDataCache, Payload, ResourceFactory, check_loaded};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::text::{TextKind, decode_text};
use crate::resource::{Resource, ResourceClient, ResourceType};

/// Decoded transform style sheet text.
#[derive(Default)]
pub struct XslPayload {
    sheet_text: Option<Rc<str>>,
}

impl DecodedDataCache for XslPayload {
    fn decoded_size(&self) -> usize {
        self.sheet_text.as_ref().map_or(0, |text| text.len())
    }

    fn has_decoded_data(&self) -> bool {
        self.sheet_text.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        let text = decode_text(
            input.data,
            TextKind::Xml,
            input.response.charset(),
            input.charset_hint,
        );
        self.sheet_text = Some(Rc::from(text));
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        if encoded_available {
            self.sheet_text = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.sheet_text = None;
    }

    fn survives_without_encoded_data(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XslStyleSheetResourceFactory;

impl ResourceFactory for XslStyleSheetResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::XslStyleSheet
    }

    fn create_payload(&self) -> Payload {
        Payload::Xsl(XslPayload::default())
    }
}

#[derive(Debug, Clone)]
pub struct XslStyleSheetResource(Resource);

impl XslStyleSheetResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, &XslStyleSheetResourceFactory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::XslStyleSheet).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    pub fn sheet_text(&self) -> Result<Rc<str>, RefusalReason> {
        check_loaded(&self.0)?;
        let mime_type = self
            .0
            .response()
            .map(|r| r.mime_type().to_string())
            .unwrap_or_default();
        if !is_xsl_mime_type(&mime_type) {
            warn!(url = %self.0.url(), mime_type, "Refused to use transform style sheet");
            return Err(RefusalReason::MimeType(mime_type));
        }
        if !self.0.ensure_decoded() {
            return Err(RefusalReason::NotLoaded);
        }
        let text = match &*self.0.payload() {
            Payload::Xsl(payload) => payload.sheet_text.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        text.ok_or(RefusalReason::NotLoaded)
    }
}

impl Deref for XslStyleSheetResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}
