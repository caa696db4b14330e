use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;

use super::mime::is_style_sheet_mime_type;
use super::{DecodeInput, DecodedDataCache, DecodedPayload, Payload, ResourceFactory, check_loaded};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::text::{TextKind, decode_text};
use crate::resource::{IntegrityDisposition, Resource, ResourceClient, ResourceType};

/// How strictly the response MIME type is checked before handing out text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MimeTypeCheck {
    /// Only `text/css`, an empty type, or `application/x-unknown-content-type`.
    #[default]
    Strict,
    /// Anything goes; used for same-origin quirks-mode sheets.
    Lax,
}

/// Decoded sheet text plus an optional parsed form owned by the consumer.
#[derive(Default)]
pub struct StyleSheetPayload {
    sheet_text: Option<Rc<str>>,
    parsed_sheet: Option<DecodedPayload>,
}

impl DecodedDataCache for StyleSheetPayload {
    fn decoded_size(&self) -> usize {
        self.sheet_text.as_ref().map_or(0, |text| text.len())
            + self.parsed_sheet.as_ref().map_or(0, DecodedPayload::size)
    }

    fn has_decoded_data(&self) -> bool {
        self.sheet_text.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        let text = decode_text(
            input.data,
            TextKind::StyleSheet,
            input.response.charset(),
            input.charset_hint,
        );
        self.sheet_text = Some(Rc::from(text));
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        self.parsed_sheet = None;
        if encoded_available {
            self.sheet_text = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.parsed_sheet = None;
        self.sheet_text = None;
    }

    fn survives_without_encoded_data(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StyleSheetResourceFactory;

impl ResourceFactory for StyleSheetResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::StyleSheet
    }

    fn create_payload(&self) -> Payload {
        Payload::StyleSheet(StyleSheetPayload::default())
    }
}

/// Typed view of a style sheet resource.
#[derive(Debug, Clone)]
pub struct StyleSheetResource(Resource);

impl StyleSheetResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, &StyleSheetResourceFactory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::StyleSheet).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// Decoded sheet text, subject to the MIME check and integrity metadata.
    pub fn sheet_text(&self, check: MimeTypeCheck) -> Result<Rc<str>, RefusalReason> {
        check_loaded(&self.0)?;
        if self.0.integrity_disposition() == IntegrityDisposition::Failed {
            return Err(RefusalReason::Integrity);
        }
        if check == MimeTypeCheck::Strict {
            let mime_type = self
                .0
                .response()
                .map(|r| r.mime_type().to_string())
                .unwrap_or_default();
            if !is_style_sheet_mime_type(&mime_type) {
                warn!(url = %self.0.url(), mime_type, "Refused to apply style sheet");
                return Err(RefusalReason::MimeType(mime_type));
            }
        }
        if !self.0.ensure_decoded() {
            return Err(RefusalReason::NotLoaded);
        }
        let text = match &*self.0.payload() {
            Payload::StyleSheet(payload) => payload.sheet_text.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        text.ok_or(RefusalReason::NotLoaded)
    }

    /// Parsed form saved by a consumer, if it survived pruning.
    pub fn parsed_style_sheet(&self) -> Option<DecodedPayload> {
        match &*self.0.payload() {
            Payload::StyleSheet(payload) => payload.parsed_sheet.clone(),
            _ => None,
        }
    }

    pub fn save_parsed_style_sheet(&self, sheet: DecodedPayload) {
        self.0.update_payload(|payload| {
            if let Payload::StyleSheet(payload) = payload {
                payload.parsed_sheet = Some(sheet);
            }
        });
    }
}

impl Deref for StyleSheetResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_text_without_encoded_bytes() {
        let mut payload = StyleSheetPayload {
            sheet_text: Some(Rc::from("a{}")),
            parsed_sheet: Some(DecodedPayload::new((), 100)),
        };
        assert_eq!(payload.decoded_size(), 103);

        payload.destroy_decoded_data(false);
        assert!(payload.has_decoded_data());
        assert_eq!(payload.decoded_size(), 3);

        payload.destroy_decoded_data(true);
        assert!(!payload.has_decoded_data());
        assert_eq!(payload.decoded_size(), 0);
    }
}
