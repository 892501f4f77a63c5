//! Outbound HTTP client.
//!
//! Builds and executes a single downstream request from an
//! [`OutboundRequest`]. The body encoding is chosen by the [`Body`] variant:
//!
//! - [`Body::Raw`] is sent verbatim (callers use it for
//!   `application/x-www-form-urlencoded` payloads they prepared themselves)
//! - [`Body::None`] sends an empty payload
//! - [`Body::Json`] is serialized to JSON before any I/O happens
//!
//! Caller-supplied headers are set exactly as given. When the caller supplies
//! no headers at all, `Content-Type: application/json` is set instead.
//!
//! Query parameters REPLACE the target URL's query string; they are never
//! merged key by key with it.
//!
//! A non-2xx status is not an error here. The response is handed back and the
//! caller decides what the status means.

use crate::context::RequestContext;
use crate::errors::{GatewayError, Result};
use crate::metrics_defs::DOWNSTREAM_REQUEST_DURATION;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Response};
use hyper::body::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use shared::histogram;
use std::time::Instant;
use url::{Url, form_urlencoded};

/// Ordered string multimap used for headers and query parameters
pub type MultiMap = IndexMap<String, Vec<String>>;

/// Outbound request payload
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    None,
    Raw(String),
    Json(serde_json::Value),
}

impl Body {
    /// Converts any serializable value into a JSON body. Fails with
    /// `Encoding` before anything is sent when the value cannot be
    /// represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Body::Json)
            .map_err(|e| GatewayError::Encoding(e.to_string()))
    }

    fn encode(&self) -> Result<Option<Bytes>> {
        match self {
            Body::None => Ok(None),
            Body::Raw(raw) => Ok(Some(Bytes::from(raw.clone()))),
            Body::Json(value) => serde_json::to_vec(value)
                .map(|bytes| Some(Bytes::from(bytes)))
                .map_err(|e| GatewayError::Encoding(e.to_string())),
        }
    }
}

/// Everything needed to issue one downstream call. Built fresh per call.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Option<MultiMap>,
    pub query: Option<MultiMap>,
    pub body: Body,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: None,
            query: None,
            body: Body::None,
        }
    }

    pub fn with_headers(mut self, headers: MultiMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_query(mut self, query: MultiMap) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

/// Downstream HTTP client. Cloning is cheap and clones share one
/// connection pool, so a single instance serves all concurrent requests.
#[derive(Clone, Debug, Default)]
pub struct Client {
    http: reqwest::Client,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured reqwest client, e.g. one with custom TLS or proxy settings.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Joins `path` onto `base`, keeping any path prefix the base carries
    /// (`http://host/v1` + `/users` is `http://host/v1/users`).
    pub fn endpoint(base: &Url, path: &str) -> Url {
        let mut url = base.clone();
        let prefix = base.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Issues the request and collects the full response body.
    ///
    /// Cancellation or expiry of `ctx` aborts the call and yields `Transport`.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: OutboundRequest,
    ) -> Result<Response<Bytes>> {
        let url = build_url(&request.url, request.query.as_ref())?;
        let payload = request.body.encode()?;
        let headers = build_headers(request.headers.as_ref())?;

        let mut builder = self.http.request(request.method, url).headers(headers);
        if let Some(payload) = payload {
            builder = builder.body(payload);
        }

        let start = Instant::now();
        let result = ctx
            .run(async {
                let response = builder
                    .send()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?;

                let status = response.status();
                let version = response.version();
                let headers = response.headers().clone();
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?;

                let mut response = Response::new(body);
                *response.status_mut() = status;
                *response.version_mut() = version;
                *response.headers_mut() = headers;
                Ok(response)
            })
            .await;

        let outcome = match &result {
            Ok(response) if response.status().is_success() => "success",
            Ok(_) => "error_status",
            Err(_) => "transport_error",
        };
        histogram!(DOWNSTREAM_REQUEST_DURATION, "outcome" => outcome)
            .record(start.elapsed().as_secs_f64());

        result
    }
}

fn build_url(target: &str, query: Option<&MultiMap>) -> Result<Url> {
    let mut url =
        Url::parse(target).map_err(|e| GatewayError::InvalidUrl(format!("{e}: {target}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(GatewayError::InvalidUrl(target.to_string()));
    }

    if let Some(query) = query {
        let encoded = encode_query(query);
        url.set_query((!encoded.is_empty()).then_some(encoded.as_str()));
    }

    Ok(url)
}

/// Form-encodes the parameters with keys in sorted order. Values of one key
/// keep their given order.
pub fn encode_query(query: &MultiMap) -> String {
    let mut pairs: Vec<_> = query.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in pairs {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}

fn build_headers(headers: Option<&MultiMap>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();

    let Some(headers) = headers else {
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(map);
    };

    for (name, values) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GatewayError::InvalidHeader(name.clone()))?;
        // set semantics: the last value of a repeated header wins
        for value in values {
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| GatewayError::InvalidHeader(name.clone()))?;
            map.insert(header_name.clone(), header_value);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockDownstream, closed_port_url, start_unresponsive_server};
    use std::collections::HashMap;
    use std::time::Duration;

    fn multimap(pairs: &[(&str, &[&str])]) -> MultiMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_query_replaces_existing_query_string() {
        let query = multimap(&[("name", &["dip 太郎"])]);
        let url = build_url("http://mock-api/users?stale=1&name=old", Some(&query)).unwrap();
        assert_eq!(url.query(), Some("name=dip+%E5%A4%AA%E9%83%8E"));
    }

    #[test]
    fn test_query_keeps_every_value_and_sorts_keys() {
        let query = multimap(&[("userID", &["2", "1", "2"]), ("age", &["25"])]);
        let url = build_url("http://mock-api/entries", Some(&query)).unwrap();
        assert_eq!(url.query(), Some("age=25&userID=2&userID=1&userID=2"));
    }

    #[test]
    fn test_empty_query_clears_query_string() {
        let url = build_url("http://mock-api/users?stale=1", Some(&MultiMap::new())).unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.as_str(), "http://mock-api/users");

        // no query map at all leaves the URL untouched
        let url = build_url("http://mock-api/users?stale=1", None).unwrap();
        assert_eq!(url.query(), Some("stale=1"));
    }

    #[test]
    fn test_invalid_urls() {
        for target in [":\\test", "mock-api/users", "ftp://mock-api/users", "http://"] {
            assert!(
                matches!(build_url(target, None), Err(GatewayError::InvalidUrl(_))),
                "{target} should be rejected"
            );
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("http://mock-api").unwrap();
        assert_eq!(Client::endpoint(&base, "/users").as_str(), "http://mock-api/users");

        let base = Url::parse("http://mock-api:8080/v1/").unwrap();
        assert_eq!(
            Client::endpoint(&base, "/entries").as_str(),
            "http://mock-api:8080/v1/entries"
        );

        let base = Url::parse("http://mock-api/v1?debug=1").unwrap();
        assert_eq!(Client::endpoint(&base, "users").as_str(), "http://mock-api/v1/users");
    }

    #[test]
    fn test_default_headers() {
        let headers = build_headers(None).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_caller_headers_used_as_given() {
        let headers = build_headers(Some(&multimap(&[
            ("key", &["dip"]),
            ("Content-Type", &["application/x-www-form-urlencoded"]),
            ("x-repeated", &["first", "last"]),
        ])))
        .unwrap();

        assert_eq!(headers.get("key").unwrap(), "dip");
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(headers.get_all("x-repeated").iter().count(), 1);
        assert_eq!(headers.get("x-repeated").unwrap(), "last");

        // supplying headers without a content type does not add one
        let headers = build_headers(Some(&multimap(&[("key", &["dip"])]))).unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_invalid_headers() {
        let result = build_headers(Some(&multimap(&[("bad header", &["x"])])));
        assert!(matches!(result, Err(GatewayError::InvalidHeader(_))));

        let result = build_headers(Some(&multimap(&[("key", &["line\nbreak"])])));
        assert!(matches!(result, Err(GatewayError::InvalidHeader(_))));
    }

    #[test]
    fn test_body_encoding() {
        assert_eq!(Body::None.encode().unwrap(), None);
        assert_eq!(
            Body::Raw("age=24&name=dip".into()).encode().unwrap(),
            Some(Bytes::from_static(b"age=24&name=dip"))
        );

        let body = Body::json(&HashMap::from([("name", "dip 次郎")])).unwrap();
        let encoded = body.encode().unwrap().unwrap();
        let decoded: HashMap<String, String> = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, HashMap::from([("name".to_string(), "dip 次郎".to_string())]));
    }

    #[test]
    fn test_unencodable_json_body() {
        // JSON object keys must be strings
        let value = HashMap::from([((1, 2), "tuple key")]);
        assert!(matches!(Body::json(&value), Err(GatewayError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_execute_sends_request_as_described() {
        let mock = MockDownstream::start(|_| Response::new(Bytes::from_static(b"[]"))).await;
        let client = Client::new();

        let request = OutboundRequest::new(Method::POST, mock.url("/users?ignored=1"))
            .with_headers(multimap(&[
                ("key", &["dip"]),
                ("Content-Type", &["application/x-www-form-urlencoded"]),
            ]))
            .with_query(multimap(&[("name", &["dip 次郎"])]))
            .with_body(Body::Raw("age=24&name=dip+%E6%AC%A1%E9%83%8E".into()));

        let response = client
            .execute(&RequestContext::background(), request)
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"[]");

        let recorded = mock.requests();
        assert_eq!(recorded.len(), 1);
        let sent = &recorded[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.path, "/users");
        assert_eq!(sent.query.as_deref(), Some("name=dip+%E6%AC%A1%E9%83%8E"));
        assert_eq!(sent.headers.get("key").unwrap(), "dip");
        assert_eq!(
            sent.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(sent.body.as_ref(), b"age=24&name=dip+%E6%AC%A1%E9%83%8E");
    }

    #[tokio::test]
    async fn test_execute_json_body_round_trip() {
        let mock = MockDownstream::start(|req| Response::new(req.body.clone())).await;
        let client = Client::new();

        let payload = serde_json::json!({"name": "dip 次郎", "age": 24, "tags": ["a", "b"]});
        let request = OutboundRequest::new(Method::POST, mock.url("/echo"))
            .with_body(Body::json(&payload).unwrap());

        let response = client
            .execute(&RequestContext::background(), request)
            .await
            .unwrap();
        let echoed: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(echoed, payload);

        let sent = &mock.requests()[0];
        assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_execute_non_success_status_is_not_an_error() {
        let mock = MockDownstream::start(|_| {
            let mut response = Response::new(Bytes::from_static(b"Invalid parameters"));
            *response.status_mut() = http::StatusCode::BAD_REQUEST;
            response
        })
        .await;

        let response = Client::new()
            .execute(
                &RequestContext::background(),
                OutboundRequest::new(Method::GET, mock.url("/users")),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(response.body().as_ref(), b"Invalid parameters");
    }

    #[tokio::test]
    async fn test_execute_invalid_url_makes_no_call() {
        let result = Client::new()
            .execute(
                &RequestContext::background(),
                OutboundRequest::new(Method::GET, ":\\test"),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_execute_connection_refused() {
        let url = closed_port_url().join("/users").unwrap();
        let result = Client::new()
            .execute(
                &RequestContext::background(),
                OutboundRequest::new(Method::GET, url.as_str()),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_execute_redirect_loop_is_transport_error() {
        let mock = MockDownstream::start(|_| {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = http::StatusCode::FOUND;
            response
                .headers_mut()
                .insert(http::header::LOCATION, HeaderValue::from_static("/users"));
            response
        })
        .await;

        let result = Client::new()
            .execute(
                &RequestContext::background(),
                OutboundRequest::new(Method::GET, mock.url("/users")),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_with_http_client_uses_its_redirect_policy() {
        let mock = MockDownstream::start(|_| {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = http::StatusCode::FOUND;
            response
                .headers_mut()
                .insert(http::header::LOCATION, HeaderValue::from_static("/users"));
            response
        })
        .await;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let response = Client::with_http_client(http)
            .execute(
                &RequestContext::background(),
                OutboundRequest::new(Method::GET, mock.url("/users")),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::FOUND);
        assert_eq!(response.headers()[http::header::LOCATION], "/users");
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_aborted_by_cancellation() {
        let url = start_unresponsive_server().await;
        let ctx = RequestContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = Client::new()
            .execute(&ctx, OutboundRequest::new(Method::GET, url.join("/users").unwrap().as_str()))
            .await;
        match result {
            Err(GatewayError::Transport(message)) => assert_eq!(message, "request cancelled"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_aborted_by_deadline() {
        let url = start_unresponsive_server().await;
        let ctx = RequestContext::new(Some(Duration::from_millis(50)));

        let result = Client::new()
            .execute(&ctx, OutboundRequest::new(Method::GET, url.as_str()))
            .await;
        match result {
            Err(GatewayError::Transport(message)) => assert_eq!(message, "deadline exceeded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
