//! Shared plumbing for the blocking HTTP clients used by both backends.

use crate::error::{CirunError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("cirun/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Parse a base URL once so malformed overrides are caught before any call.
pub(crate) fn parse_base(base: &str) -> Result<Url> {
    let url = Url::parse(base).map_err(|_| CirunError::InvalidUrl(base.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(CirunError::InvalidUrl(base.to_string()));
    }
    Ok(url)
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CirunError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Raw body of a rejected request. A body that cannot be read is reported
/// in its place rather than dropped.
pub(crate) fn body_text(response: Response) -> String {
    let url = response.url().to_string();
    response.text().unwrap_or_else(|e| {
        debug!(%url, "failed to read response body: {e}");
        unreadable_body(e)
    })
}

fn unreadable_body(err: impl Display) -> String {
    format!("<response body unreadable: {err}>")
}

/// Decode a successful JSON response, or turn any other status into
/// `UnexpectedStatus` with the raw body.
pub(crate) fn json_or_status<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text()?;
    if !status.is_success() {
        return Err(CirunError::UnexpectedStatus {
            url,
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
