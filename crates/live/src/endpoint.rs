// Push endpoint derivation from the REST base URL.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid api_url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("api_url `{0}` must use http, https, ws or wss")]
    UnsupportedScheme(String),
}

/// Build the live endpoint for `token`.
///
/// `http` becomes `ws` and `https` becomes `wss`; the path is replaced and the
/// token is carried in a single query parameter.
pub fn live_endpoint(
    api_url: &str,
    ws_path: &str,
    token_param: &str,
    token: &str,
) -> Result<Url, EndpointError> {
    let parsed = Url::parse(api_url).map_err(|error| EndpointError::InvalidUrl {
        url: api_url.to_string(),
        reason: error.to_string(),
    })?;

    let scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(EndpointError::UnsupportedScheme(api_url.to_string())),
    };

    let mut endpoint = parsed;
    endpoint.set_scheme(scheme).map_err(|()| EndpointError::InvalidUrl {
        url: api_url.to_string(),
        reason: format!("cannot switch scheme to {scheme}"),
    })?;
    endpoint.set_path(ws_path);
    endpoint.set_fragment(None);
    endpoint.query_pairs_mut().clear().append_pair(token_param, token);
    Ok(endpoint)
}

/// Endpoint with credentials masked, for logs.
pub fn redacted(endpoint: &Url) -> String {
    let mut masked = endpoint.clone();
    let pairs: Vec<(String, String)> = endpoint
        .query_pairs()
        .map(|(key, _)| (key.into_owned(), "***".to_string()))
        .collect();
    if pairs.is_empty() {
        return masked.to_string();
    }
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
