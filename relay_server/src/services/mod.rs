//! Relay services — the decode → map → resolve → deliver pipeline and its
//! outbound clients.

pub mod decode_service;
pub mod github_service;
pub mod identity_service;
pub mod relay_service;
pub mod sourcerepo_service;
pub mod status_service;

use url::Url;

/// Append path segments to an API base URL, percent-encoding each one.
///
/// Returns `None` when `base` cannot carry a path.
pub fn api_endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
    Some(url)
}
