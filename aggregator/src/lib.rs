pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod downstream;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod joiner;
pub mod metrics_defs;
pub mod resolver;
pub mod router;

#[cfg(test)]
mod testutils;

use crate::api::echo::EchoHandler;
use crate::api::entries::EntriesHandler;
use crate::api::users::UsersHandler;
use crate::client::Client;
use crate::downstream::Downstream;
use crate::errors::GatewayError;
use crate::executor::StageExecutor;
use crate::joiner::{ENTRIES_PATH, Joiner};
use crate::resolver::{Resolver, USERS_PATH};
use crate::router::Router;
use http::StatusCode;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::pin::Pin;
use std::sync::Arc;

/// Builds the route table for the main listener. All handlers share one
/// outbound client.
pub fn build_router(config: &config::Config) -> Router {
    let downstream = Downstream::new(Client::new(), &config.downstream);
    let request_timeout = config.downstream.request_timeout();

    let entries = EntriesHandler::new(
        Resolver::new(downstream.clone()),
        Joiner::new(downstream.clone()),
        StageExecutor::new(config.stage_execution),
        request_timeout,
    );

    Router::new()
        .route("/echo", Arc::new(EchoHandler))
        .route(USERS_PATH, Arc::new(UsersHandler::new(downstream, request_timeout)))
        .route(ENTRIES_PATH, Arc::new(entries))
}

/// Serves the gateway until a listener fails.
pub async fn run(config: config::Config) -> Result<(), GatewayError> {
    tracing::info!(
        downstream = %config.downstream.base_url,
        stage_execution = ?config.stage_execution,
        "Starting gateway"
    );

    let gateway_service = GatewayService::new(build_router(&config));
    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        gateway_service,
    );

    match &config.admin_listener {
        Some(admin_listener) => {
            let admin_service = AdminService::<_, GatewayError>::new(|| true);
            let admin_task =
                run_http_service(&admin_listener.host, admin_listener.port, admin_service);
            tokio::try_join!(gateway_task, admin_task)?;
        }
        None => gateway_task.await?,
    }

    Ok(())
}

/// Inbound hyper service: collects the request body and hands the request
/// to the router.
pub struct GatewayService {
    router: Router,
}

impl GatewayService {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.router.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let response = match body.collect().await {
                Ok(collected) => {
                    let request = Request::from_parts(parts, collected.to_bytes());
                    router.route_request(request).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to read request body");
                    shared::http::make_error_response(StatusCode::BAD_REQUEST)
                }
            };

            Ok(response.map(|body| Full::new(body).map_err(|e| match e {}).boxed()))
        })
    }
}
