use crate::api::utils::{first_values, json_response, parse_query};
use crate::errors::{GatewayError, Result};
use crate::handler::Handler;
use async_trait::async_trait;
use http::{Method, StatusCode};
use hyper::body::Bytes;
use hyper::{Request, Response};
use std::collections::BTreeMap;

/// `GET /echo` returns the query parameters as a JSON object, one (first)
/// value per key.
pub struct EchoHandler;

impl EchoHandler {
    fn echo(&self, request: &Request<Bytes>) -> Result<Response<Bytes>> {
        if request.method() != Method::GET {
            return Err(GatewayError::MethodNotAllowed);
        }

        let params = parse_query(request.uri().query())?;
        let echoed: BTreeMap<&str, &str> = first_values(&params).collect();
        json_response(StatusCode::OK, &echoed)
    }
}

#[async_trait]
impl Handler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.echo(&request).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Echo request rejected");
            e.into_response()
        })
    }
}
