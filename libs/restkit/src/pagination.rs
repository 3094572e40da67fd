//! `next` link construction for list responses.

use axum::http::{header, HeaderMap, Uri};

/// Scheme and authority a request was addressed to.
///
/// Absolute-form URIs win; otherwise `X-Forwarded-Proto` and `Host` are
/// consulted, defaulting to plain http.
pub fn request_origin(uri: &Uri, headers: &HeaderMap) -> Option<(String, String)> {
    let scheme = uri
        .scheme_str()
        .map(str::to_owned)
        .or_else(|| header_str(headers, "x-forwarded-proto").map(str::to_owned))
        .unwrap_or_else(|| "http".to_owned());
    let host = uri
        .authority()
        .map(|a| a.as_str().to_owned())
        .or_else(|| header_str(headers, header::HOST.as_str()).map(str::to_owned))?;
    Some((scheme, host))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `<scheme>://<host>?next=<cursor>`. Path and query of the request are
/// discarded. `None` when there is no cursor or no known host.
pub fn build_next_link(uri: &Uri, headers: &HeaderMap, cursor: Option<&str>) -> Option<String> {
    let cursor = cursor.filter(|c| !c.is_empty())?;
    let (scheme, host) = request_origin(uri, headers)?;
    Some(format!(
        "{scheme}://{host}?next={}",
        urlencoding::encode(cursor)
    ))
}
