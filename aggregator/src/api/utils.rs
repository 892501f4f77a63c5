use crate::client::MultiMap;
use crate::errors::{GatewayError, Result};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, TRANSFER_ENCODING};
use http::{StatusCode, Version};
use hyper::Response;
use hyper::body::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::http::filter_hop_by_hop;
use url::form_urlencoded;

/// Parses a raw query string as `application/x-www-form-urlencoded`.
///
/// Rejects `;` separators and `%` escapes that are not followed by two hex
/// digits. Keys keep their first-seen order and every value is kept.
pub fn parse_query(query: Option<&str>) -> Result<MultiMap> {
    let raw = query.unwrap_or_default();

    if raw.contains(';') {
        return Err(GatewayError::BadRequest(
            "invalid semicolon separator in query".into(),
        ));
    }

    let bytes = raw.as_bytes();
    for (i, _) in raw.match_indices('%') {
        let valid = bytes.len() > i + 2
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if !valid {
            let escape: String = raw[i..].chars().take(3).collect();
            return Err(GatewayError::BadRequest(format!(
                "invalid URL escape {escape:?}"
            )));
        }
    }

    let mut params = MultiMap::new();
    for (key, value) in form_urlencoded::parse(bytes) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    Ok(params)
}

/// First value of every key
pub fn first_values(params: &MultiMap) -> impl Iterator<Item = (&str, &str)> {
    params.iter().filter_map(|(key, values)| {
        values
            .first()
            .map(|value| (key.as_str(), value.as_str()))
    })
}

/// Deserializes a JSON request body. Malformed input is the client's fault.
pub fn deserialize_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| GatewayError::BadRequest(e.to_string()))
}

/// Serializes `value` into a JSON response with the given status.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Bytes>> {
    let bytes = serde_json::to_vec(value).map_err(|e| GatewayError::Encoding(e.to_string()))?;

    let mut response = Response::new(Bytes::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

/// Common header normalization for responses copied from downstream.
pub fn normalize_headers(headers: &mut HeaderMap, version: Version) -> &mut HeaderMap {
    filter_hop_by_hop(headers, version);
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);

    headers
}
