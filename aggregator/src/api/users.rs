use crate::api::utils::{deserialize_body, first_values, normalize_headers, parse_query};
use crate::client::{Body, MultiMap, encode_query};
use crate::context::RequestContext;
use crate::downstream::Downstream;
use crate::errors::{GatewayError, Result};
use crate::handler::Handler;
use crate::resolver::USERS_PATH;
use async_trait::async_trait;
use http::Method;
use hyper::body::Bytes;
use hyper::{Request, Response};
use std::collections::HashMap;
use std::time::Duration;

/// Pass-through to the downstream users resource.
///
/// - `GET /users?...` forwards the first value of each query parameter
/// - `POST /users` takes `{"name": .., "age": ..}` as JSON and creates the
///   user with a form-encoded body
///
/// The downstream status, headers and body are copied back as they are.
pub struct UsersHandler {
    downstream: Downstream,
    request_timeout: Option<Duration>,
}

impl UsersHandler {
    pub fn new(downstream: Downstream, request_timeout: Option<Duration>) -> Self {
        Self {
            downstream,
            request_timeout,
        }
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let params = parse_query(request.uri().query())?;
        let query: MultiMap = first_values(&params)
            .map(|(key, value)| (key.to_string(), vec![value.to_string()]))
            .collect();

        self.downstream
            .execute(
                ctx,
                Method::GET,
                USERS_PATH,
                Some(query),
                self.downstream.default_headers(),
                Body::None,
            )
            .await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let params: HashMap<String, String> = deserialize_body(request.body())?;

        let name = params
            .get("name")
            .ok_or_else(|| GatewayError::BadRequest("name is required".into()))?;
        let age = params
            .get("age")
            .ok_or_else(|| GatewayError::BadRequest("age is required".into()))?;

        let form = encode_query(&MultiMap::from([
            ("name".to_string(), vec![name.clone()]),
            ("age".to_string(), vec![age.clone()]),
        ]));

        let mut headers = self.downstream.default_headers();
        headers.insert(
            "Content-Type".into(),
            vec!["application/x-www-form-urlencoded".into()],
        );

        self.downstream
            .execute(ctx, Method::POST, USERS_PATH, None, headers, Body::Raw(form))
            .await
    }
}

#[async_trait]
impl Handler for UsersHandler {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let ctx = RequestContext::new(self.request_timeout);
        let _guard = ctx.cancel_on_drop();

        let result = match *request.method() {
            Method::GET => self.list(&ctx, &request).await,
            Method::POST => self.create(&ctx, &request).await,
            _ => Err(GatewayError::MethodNotAllowed),
        };

        match result {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                normalize_headers(&mut parts.headers, parts.version);
                Response::from_parts(parts, body)
            }
            Err(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!(error = %e, "Users request failed");
                } else {
                    tracing::debug!(error = %e, "Users request rejected");
                }
                e.into_response()
            }
        }
    }
}
