use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;

use super::mime::{is_blocked_script_mime_type, is_nosniff, is_supported_javascript_mime_type};
use super::{DecodeInput, DecodedDataCache, Payload, ResourceFactory, check_loaded};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::text::{TextKind, decode_text};
use crate::resource::{IntegrityDisposition, Resource, ResourceClient, ResourceType};

#[derive(Default)]
pub struct ScriptPayload {
    source_text: Option<Rc<str>>,
}

impl DecodedDataCache for ScriptPayload {
    fn decoded_size(&self) -> usize {
        self.source_text.as_ref().map_or(0, |text| text.len())
    }

    fn has_decoded_data(&self) -> bool {
        self.source_text.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        let text = decode_text(
            input.data,
            TextKind::Script,
            input.response.charset(),
            input.charset_hint,
        );
        self.source_text = Some(Rc::from(text));
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        if encoded_available {
            self.source_text = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.source_text = None;
    }

    fn survives_without_encoded_data(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptResourceFactory;

impl ResourceFactory for ScriptResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Script
    }

    fn create_payload(&self) -> Payload {
        Payload::Script(ScriptPayload::default())
    }
}

/// Typed view of a script resource.
#[derive(Debug, Clone)]
pub struct ScriptResource(Resource);

impl ScriptResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, &ScriptResourceFactory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::Script).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// Reasons this script must not run, if any.
    pub fn check_executable(&self) -> Result<(), RefusalReason> {
        check_loaded(&self.0)?;
        if self.0.integrity_disposition() == IntegrityDisposition::Failed {
            return Err(RefusalReason::Integrity);
        }
        let Some(response) = self.0.response() else {
            return Ok(());
        };
        let mime_type = response.mime_type();
        let refused = is_blocked_script_mime_type(mime_type)
            || (is_nosniff(response.header_str("x-content-type-options"))
                && !is_supported_javascript_mime_type(mime_type));
        if refused {
            warn!(url = %self.0.url(), mime_type, "Refused to execute script");
            return Err(RefusalReason::MimeType(mime_type.to_string()));
        }
        Ok(())
    }

    pub fn source_text(&self) -> Result<Rc<str>, RefusalReason> {
        self.check_executable()?;
        if !self.0.ensure_decoded() {
            return Err(RefusalReason::NotLoaded);
        }
        let text = match &*self.0.payload() {
            Payload::Script(payload) => payload.source_text.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        text.ok_or(RefusalReason::NotLoaded)
    }
}

impl Deref for ScriptResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}
