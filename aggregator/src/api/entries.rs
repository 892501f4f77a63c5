//! `GET /entries?name=...` aggregation.
//!
//! A request moves through these states:
//!
//! ```text
//! ParsingInput -> ResolvingUsers -> UserNotFound
//!                                -> ResolvingEntries -> Responding
//! ```
//!
//! Any stage may end in `Failed` instead. The two downstream stages are
//! strictly sequential since the entries lookup needs the resolved ids;
//! `StageExecutor` only decides whether each stage runs on the request task
//! or on a task of its own.

use crate::api::utils::{json_response, parse_query};
use crate::context::RequestContext;
use crate::errors::{GatewayError, Result};
use crate::executor::StageExecutor;
use crate::handler::Handler;
use crate::joiner::{Entry, Joiner};
use crate::metrics_defs::USER_NOT_FOUND;
use crate::resolver::Resolver;
use async_trait::async_trait;
use http::{Method, StatusCode};
use hyper::body::Bytes;
use hyper::{Request, Response};
use serde::Serialize;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EntriesResponse {
    entries: Vec<Entry>,
}

pub struct EntriesHandler {
    resolver: Arc<Resolver>,
    joiner: Arc<Joiner>,
    executor: StageExecutor,
    request_timeout: Option<Duration>,
}

impl EntriesHandler {
    pub fn new(
        resolver: Resolver,
        joiner: Joiner,
        executor: StageExecutor,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            joiner: Arc::new(joiner),
            executor,
            request_timeout,
        }
    }

    async fn aggregate(
        &self,
        ctx: &RequestContext,
        request: &Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        if request.method() != Method::GET {
            return Err(GatewayError::MethodNotAllowed);
        }

        let mut params = parse_query(request.uri().query())?;
        let names = params
            .swap_remove("name")
            .filter(|names| !names.is_empty())
            .ok_or_else(|| GatewayError::BadRequest("name is required".into()))?;

        let resolver = self.resolver.clone();
        let stage_ctx = ctx.child();
        let user_ids = self
            .executor
            .run(ctx, async move {
                resolver.resolve_user_ids(&stage_ctx, &names).await
            })
            .await?;

        if user_ids.is_empty() {
            counter!(USER_NOT_FOUND).increment(1);
            return Err(GatewayError::NotFound);
        }

        let joiner = self.joiner.clone();
        let stage_ctx = ctx.child();
        let entries = self
            .executor
            .run(ctx, async move {
                joiner.resolve_entries(&stage_ctx, &user_ids).await
            })
            .await?;

        json_response(StatusCode::OK, &EntriesResponse { entries })
    }
}

#[async_trait]
impl Handler for EntriesHandler {
    fn name(&self) -> &'static str {
        "entries"
    }

    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let ctx = RequestContext::new(self.request_timeout);
        // dropping this future (client gone) cancels in-flight stages
        let _guard = ctx.cancel_on_drop();

        match self.aggregate(&ctx, &request).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    GatewayError::NotFound => tracing::info!("No user matched the name filter"),
                    GatewayError::BadRequest(_) | GatewayError::MethodNotAllowed => {
                        tracing::debug!(error = %e, "Entries request rejected")
                    }
                    _ => tracing::error!(error = %e, "Entries aggregation failed"),
                }
                e.into_response()
            }
        }
    }
}
