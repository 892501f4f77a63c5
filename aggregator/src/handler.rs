use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::{Request, Response};

/// Endpoint served by the router.
///
/// Handlers never fail: every error is turned into a response (with the
/// matching status code) before it leaves `handle`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Route label used in logs and metrics
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes>;
}
