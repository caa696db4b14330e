//! # Typed Resource Variants
//!
//! Each resource type composes a small decoded-payload cache on top of the
//! shared [`Resource`](crate::resource::Resource) state machine instead of
//! specializing it. The cache knows how to materialize its payload from the
//! buffered bytes, how much memory it holds, and what it may throw away when
//! the memory cache prunes.
//!
//! Typed wrappers (`StyleSheetResource`, `ScriptResource`, ...) expose the
//! decoded payload. MIME and integrity refusals are returned from those
//! accessors, so they only affect observers that ask for the typed payload.

use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::{DecodeError, RefusalReason};
use crate::http::ResourceResponse;
use crate::resource::{Resource, ResourceStatus, ResourceType};

mod document;
pub(crate) mod font;
mod image;
pub mod integrity;
pub mod mime;
mod raw;
mod script;
mod style_sheet;
mod xsl;

pub use document::{DocumentPayload, DocumentResource, DocumentResourceFactory};
pub use font::{FontLoadLimitState, FontPayload, FontResource, FontResourceFactory};
pub use image::{ImagePayload, ImageResource, ImageResourceFactory};
pub use raw::{RawResource, RawResourceFactory};
pub use script::{ScriptPayload, ScriptResource, ScriptResourceFactory};
pub use style_sheet::{MimeTypeCheck, StyleSheetPayload, StyleSheetResource, StyleSheetResourceFactory};
pub use xsl::{XslPayload, XslStyleSheetResource, XslStyleSheetResourceFactory};

/// Output of a decoder: an opaque value plus the memory it accounts for.
#[derive(Clone)]
pub struct DecodedPayload {
    value: Rc<dyn Any>,
    size: usize,
}

impl DecodedPayload {
    pub fn new<T: Any>(value: T, size: usize) -> Self {
        Self {
            value: Rc::new(value),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn value(&self) -> Rc<dyn Any> {
        self.value.clone()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for DecodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPayload").field("size", &self.size).finish()
    }
}

/// External decoder for image, font and document payloads.
pub trait PayloadDecoder {
    fn decode(&self, data: &[u8], response: &ResourceResponse) -> Result<DecodedPayload, DecodeError>;
}

/// Decoder that keeps a copy of the bytes as the decoded value.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecoder;

impl PayloadDecoder for PassthroughDecoder {
    fn decode(&self, data: &[u8], _response: &ResourceResponse) -> Result<DecodedPayload, DecodeError> {
        Ok(DecodedPayload::new(Bytes::copy_from_slice(data), data.len()))
    }
}

/// What a payload cache gets to decode from.
pub(crate) struct DecodeInput<'a> {
    pub data: &'a [u8],
    pub response: &'a ResourceResponse,
    pub charset_hint: Option<&'a str>,
}

/// Per-variant decoded data strategy.
pub(crate) trait DecodedDataCache {
    fn decoded_size(&self) -> usize;

    fn has_decoded_data(&self) -> bool;

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError>;

    /// Drop what can be rebuilt. Without encoded bytes only secondary caches
    /// may go.
    fn destroy_decoded_data(&mut self, encoded_available: bool);

    fn destroy_decoded_data_for_failed_revalidation(&mut self);

    /// Whether the encoded bytes may be released once decoded.
    fn survives_without_encoded_data(&self) -> bool;
}

/// Variant-specific state held by a resource.
pub enum Payload {
    /// Raw family: no decoded state.
    Raw,
    Image(ImagePayload),
    StyleSheet(StyleSheetPayload),
    Script(ScriptPayload),
    Font(FontPayload),
    Document(DocumentPayload),
    Xsl(XslPayload),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Payload::Raw => "Raw",
            Payload::Image(_) => "Image",
            Payload::StyleSheet(_) => "StyleSheet",
            Payload::Script(_) => "Script",
            Payload::Font(_) => "Font",
            Payload::Document(_) => "Document",
            Payload::Xsl(_) => "Xsl",
        };
        f.write_str(name)
    }
}

impl Payload {
    pub(crate) fn cache(&self) -> Option<&dyn DecodedDataCache> {
        match self {
            Payload::Raw => None,
            Payload::Image(p) => Some(p),
            Payload::StyleSheet(p) => Some(p),
            Payload::Script(p) => Some(p),
            Payload::Font(p) => Some(p),
            Payload::Document(p) => Some(p),
            Payload::Xsl(p) => Some(p),
        }
    }

    pub(crate) fn cache_mut(&mut self) -> Option<&mut dyn DecodedDataCache> {
        match self {
            Payload::Raw => None,
            Payload::Image(p) => Some(p),
            Payload::StyleSheet(p) => Some(p),
            Payload::Script(p) => Some(p),
            Payload::Font(p) => Some(p),
            Payload::Document(p) => Some(p),
            Payload::Xsl(p) => Some(p),
        }
    }

    pub(crate) fn decoded_size(&self) -> usize {
        self.cache().map_or(0, |c| c.decoded_size())
    }

    pub(crate) fn has_decoded_data(&self) -> bool {
        self.cache().is_some_and(|c| c.has_decoded_data())
    }

    pub(crate) fn survives_without_encoded_data(&self) -> bool {
        self.cache().is_some_and(|c| c.survives_without_encoded_data())
    }
}

/// Shared precondition of the typed accessors. A resource under
/// revalidation still serves its previous payload.
pub(crate) fn check_loaded(resource: &Resource) -> Result<(), RefusalReason> {
    if resource.is_cache_validator() {
        return Ok(());
    }
    match resource.status() {
        ResourceStatus::Cached => Ok(()),
        ResourceStatus::DecodeError => Err(RefusalReason::Decode),
        ResourceStatus::LoadError => Err(RefusalReason::LoadFailed),
        ResourceStatus::NotStarted | ResourceStatus::Pending => Err(RefusalReason::NotLoaded),
    }
}

/// Creates resources of one type for the fetcher.
pub trait ResourceFactory {
    fn resource_type(&self) -> ResourceType;

    fn create_payload(&self) -> Payload;
}
