//! Web fonts.
//!
//! A font request does not hit the network until the font is actually needed
//! for layout ([`FontResource::begin_load_if_needed`]) unless it was issued as
//! a preload. Once loading, two timers track how long text has been waiting:
//! past the short limit observers may render with a fallback font, past the
//! long limit they should give up on the web font.

use std::ops::Deref;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use super::{
    DecodeInput, DecodedDataCache, DecodedPayload, PassthroughDecoder, Payload, PayloadDecoder,
    ResourceFactory, check_loaded,
};
use crate::error::{DecodeError, FetchError, RefusalReason};
use crate::fetcher::ResourceFetcher;
use crate::http::FetchRequest;
use crate::resource::{Resource, ResourceClient, ResourceType};
use crate::scheduler::TaskHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FontLoadLimitState {
    #[default]
    UnderLimit,
    ShortLimitExceeded,
    LongLimitExceeded,
}

pub struct FontPayload {
    decoder: Rc<dyn PayloadDecoder>,
    font_data: Option<DecodedPayload>,
    limit_state: FontLoadLimitState,
    load_initiated: bool,
    short_limit_timer: Option<TaskHandle>,
    long_limit_timer: Option<TaskHandle>,
}

impl FontPayload {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self {
            decoder,
            font_data: None,
            limit_state: FontLoadLimitState::UnderLimit,
            load_initiated: false,
            short_limit_timer: None,
            long_limit_timer: None,
        }
    }

    fn stop_timers(&mut self) {
        for timer in [self.short_limit_timer.take(), self.long_limit_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.cancel();
        }
    }
}

impl DecodedDataCache for FontPayload {
    fn decoded_size(&self) -> usize {
        self.font_data.as_ref().map_or(0, DecodedPayload::size)
    }

    fn has_decoded_data(&self) -> bool {
        self.font_data.is_some()
    }

    fn decode(&mut self, input: DecodeInput<'_>) -> Result<(), DecodeError> {
        self.font_data = Some(self.decoder.decode(input.data, input.response)?);
        Ok(())
    }

    fn destroy_decoded_data(&mut self, encoded_available: bool) {
        if encoded_available {
            self.font_data = None;
        }
    }

    fn destroy_decoded_data_for_failed_revalidation(&mut self) {
        self.font_data = None;
    }

    fn survives_without_encoded_data(&self) -> bool {
        true
    }
}

fn with_font<R>(resource: &Resource, f: impl FnOnce(&mut FontPayload) -> R) -> Option<R> {
    match &mut *resource.payload_mut() {
        Payload::Font(payload) => Some(f(payload)),
        _ => None,
    }
}

pub(crate) fn load_limit_state(resource: &Resource) -> FontLoadLimitState {
    match &*resource.payload() {
        Payload::Font(payload) => payload.limit_state,
        _ => FontLoadLimitState::UnderLimit,
    }
}

/// Late observers learn about limits already crossed.
pub(crate) fn did_add_client(resource: &Resource, client: &Rc<dyn ResourceClient>) {
    let state = load_limit_state(resource);
    if state >= FontLoadLimitState::ShortLimitExceeded {
        client.font_load_short_limit_exceeded(resource);
    }
    if state == FontLoadLimitState::LongLimitExceeded && resource.has_client(client) {
        client.font_load_long_limit_exceeded(resource);
    }
}

pub(crate) fn start_load_limit_timers(resource: &Resource, short_limit: Duration, long_limit: Duration) {
    let scheduler = resource.scheduler().clone();
    let weak = resource.downgrade();
    let short = scheduler.post_delayed("font-short-limit", short_limit, move || {
        if let Some(resource) = weak.upgrade() {
            limit_reached(&resource, FontLoadLimitState::ShortLimitExceeded);
        }
    });
    let weak = resource.downgrade();
    let long = scheduler.post_delayed("font-long-limit", long_limit, move || {
        if let Some(resource) = weak.upgrade() {
            limit_reached(&resource, FontLoadLimitState::LongLimitExceeded);
        }
    });
    with_font(resource, |font| {
        font.stop_timers();
        font.short_limit_timer = Some(short);
        font.long_limit_timer = Some(long);
    });
}

fn limit_reached(resource: &Resource, state: FontLoadLimitState) {
    if !resource.is_loading() {
        return;
    }
    with_font(resource, |font| font.limit_state = state);
    debug!(url = %resource.url(), ?state, "Font load limit reached");
    match state {
        FontLoadLimitState::ShortLimitExceeded => resource.notify_font_short_limit(),
        FontLoadLimitState::LongLimitExceeded => resource.notify_font_long_limit(),
        FontLoadLimitState::UnderLimit => {}
    }
}

pub(crate) fn stop_load_limit_timers(resource: &Resource) {
    with_font(resource, FontPayload::stop_timers);
}

pub(crate) fn reset_for_revalidation(resource: &Resource) {
    with_font(resource, |font| {
        font.stop_timers();
        font.limit_state = FontLoadLimitState::UnderLimit;
        font.load_initiated = false;
    });
}

#[derive(Clone)]
pub struct FontResourceFactory {
    decoder: Rc<dyn PayloadDecoder>,
}

impl FontResourceFactory {
    pub fn new(decoder: Rc<dyn PayloadDecoder>) -> Self {
        Self { decoder }
    }
}

impl Default for FontResourceFactory {
    fn default() -> Self {
        Self::new(Rc::new(PassthroughDecoder))
    }
}

impl ResourceFactory for FontResourceFactory {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Font
    }

    fn create_payload(&self) -> Payload {
        Payload::Font(FontPayload::new(self.decoder.clone()))
    }
}

/// Typed view of a font resource.
#[derive(Debug, Clone)]
pub struct FontResource(Resource);

impl FontResource {
    pub fn fetch(
        request: FetchRequest,
        fetcher: &ResourceFetcher,
        factory: &FontResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Self, FetchError> {
        let resource = fetcher.request_resource(request, factory, client)?;
        Ok(Self(resource))
    }

    pub fn from_resource(resource: Resource) -> Option<Self> {
        (resource.resource_type() == ResourceType::Font).then_some(Self(resource))
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// Start the deferred load the first time layout needs this font.
    pub fn begin_load_if_needed(&self, fetcher: &ResourceFetcher) {
        let initiate = with_font(&self.0, |font| !std::mem::replace(&mut font.load_initiated, true))
            .unwrap_or(false);
        if initiate && self.0.still_needs_load() {
            fetcher.start_load(&self.0);
        }
    }

    pub fn load_limit_state(&self) -> FontLoadLimitState {
        load_limit_state(&self.0)
    }

    pub fn font_data(&self) -> Result<DecodedPayload, RefusalReason> {
        check_loaded(&self.0)?;
        if !self.0.ensure_decoded() {
            return Err(if self.0.error_occurred() {
                RefusalReason::Decode
            } else {
                RefusalReason::NotLoaded
            });
        }
        let data = match &*self.0.payload() {
            Payload::Font(payload) => payload.font_data.clone(),
            _ => None,
        };
        self.0.did_access_decoded_data();
        data.ok_or(RefusalReason::NotLoaded)
    }
}

impl Deref for FontResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}
