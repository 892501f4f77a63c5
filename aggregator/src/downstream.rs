use crate::client::{Body, Client, MultiMap, OutboundRequest};
use crate::config::DownstreamConfig;
use crate::context::RequestContext;
use crate::errors::{GatewayError, Result};
use http::{Method, Response};
use hyper::body::Bytes;
use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use url::Url;

/// The downstream API: base URL plus the static identifying header, both
/// fixed at construction.
#[derive(Clone, Debug)]
pub struct Downstream {
    client: Client,
    base_url: Url,
    api_key_header: String,
    api_key: String,
}

impl Downstream {
    pub fn new(client: Client, config: &DownstreamConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key_header: config.api_key_header.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Headers sent on every call unless the caller replaces them
    pub fn default_headers(&self) -> MultiMap {
        MultiMap::from([(self.api_key_header.clone(), vec![self.api_key.clone()])])
    }

    /// Issues a call to `path` under the base URL. The response is returned
    /// whatever its status.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        query: Option<MultiMap>,
        headers: MultiMap,
        body: Body,
    ) -> Result<Response<Bytes>> {
        let url = Client::endpoint(&self.base_url, path);
        let mut request = OutboundRequest::new(method, url.as_str())
            .with_headers(headers)
            .with_body(body);
        if let Some(query) = query {
            request = request.with_query(query);
        }
        self.client.execute(ctx, request).await
    }

    /// GETs `path` and decodes a JSON body. Any non-2xx status is an error.
    pub async fn get_json<T>(&self, ctx: &RequestContext, path: &str, query: MultiMap) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .execute(
                ctx,
                Method::GET,
                path,
                Some(query),
                self.default_headers(),
                Body::None,
            )
            .await
            .map_err(|e| match e {
                // the URL is built from configuration, so a bad one means the
                // downstream cannot be reached at all
                GatewayError::InvalidUrl(url) => GatewayError::Transport(url),
                other => other,
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::DownstreamStatus(response.status()));
        }

        serde_json::from_slice(response.body()).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Decodes an explicit `null` the same as an absent field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
