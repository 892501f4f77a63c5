use crate::handler::Handler;
use crate::metrics_defs::REQUEST_DURATION;
use http::StatusCode;
use hyper::body::Bytes;
use hyper::{Request, Response};
use shared::histogram;
use shared::http::make_error_response;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Dispatches inbound requests to handlers by exact path match
#[derive(Clone, Default)]
pub struct Router {
    routes: Arc<HashMap<&'static str, Arc<dyn Handler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `path`. A later registration for the same path wins.
    pub fn route(mut self, path: &'static str, handler: Arc<dyn Handler>) -> Self {
        Arc::make_mut(&mut self.routes).insert(path, handler);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.keys().copied()
    }

    /// Routes an incoming request to the matching handler
    pub async fn route_request(&self, req: Request<Bytes>) -> Response<Bytes> {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let (route, response) = match self.routes.get(path.as_str()) {
            Some(handler) => (handler.name(), handler.handle(req).await),
            None => {
                tracing::warn!(method = %method, path = %path, "No route matched");
                ("unknown", make_error_response(StatusCode::NOT_FOUND))
            }
        };

        let status = response.status();
        tracing::info!(
            method = %method,
            path = %path,
            route,
            status = status.as_u16(),
            "Handled request"
        );
        histogram!(
            REQUEST_DURATION,
            "route" => route,
            "status" => status.as_str().to_owned()
        )
        .record(start.elapsed().as_secs_f64());

        response
    }
}
