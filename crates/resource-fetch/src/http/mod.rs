//! # HTTP Model
//!
//! Request and response types as seen by the engine, plus the header
//! helpers the caching rules depend on.

pub mod cache_control;
pub mod data_url;
pub mod headers;
mod request;
mod response;

pub use cache_control::CacheControl;
pub use data_url::{DataUrl, DataUrlError};
pub use request::{
    CacheMode, CredentialsMode, FetchRequest, ResourceLoadPriority, ResourceRequest,
};
pub use response::ResourceResponse;

/// URL string with the fragment identifier removed.
pub fn url_without_fragment(url: &url::Url) -> String {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    stripped.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_stripped() {
        let url = url::Url::parse("https://example.com/a.css#section").unwrap();
        assert_eq!(url_without_fragment(&url), "https://example.com/a.css");
    }
}
