use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::{Url, form_urlencoded};

/// A request as seen by the mock downstream
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// All decoded values of `key` in the query string, in order
    pub fn query_values(&self, key: &str) -> Vec<String> {
        form_urlencoded::parse(self.query.as_deref().unwrap_or("").as_bytes())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }
}

type MockHandler = Arc<dyn Fn(&RecordedRequest) -> Response<Bytes> + Send + Sync>;

/// In-process downstream API bound to an ephemeral port. Every request is
/// recorded before the handler answers it.
pub struct MockDownstream {
    base_url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockDownstream {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Response<Bytes> + Send + Sync + 'static,
    {
        Self::start_stalling(None, handler).await
    }

    /// Like `start`, but requests to `stalled_path` are recorded and then
    /// never answered.
    pub async fn start_stalling<F>(stalled_path: Option<&'static str>, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Response<Bytes> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().unwrap();

        let handler: MockHandler = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                let recorded = recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = handler.clone();
                        let recorded = recorded.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body
                                .collect()
                                .await
                                .map(|b| b.to_bytes())
                                .unwrap_or_default();
                            let request = RecordedRequest {
                                method: parts.method,
                                path: parts.uri.path().to_string(),
                                query: parts.uri.query().map(str::to_string),
                                headers: parts.headers,
                                body,
                            };
                            recorded.lock().unwrap().push(request.clone());
                            if stalled_path == Some(request.path.as_str()) {
                                std::future::pending::<()>().await;
                            }
                            Ok::<_, Infallible>(handler(&request).map(Full::new))
                        }
                    });

                    if let Err(err) = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        eprintln!("Error serving connection: {:?}", err);
                    }
                });
            }
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            requests,
        }
    }

    /// Downstream with the fixed users/entries dataset used across tests:
    ///
    /// | ID     | Name     | Age |
    /// |--------|----------|-----|
    /// | 123456 | dip 太郎 | 25  |
    /// | 234567 | dip 次郎 | 25  |
    ///
    /// and one entry per user, `案件情報1` and `案件情報2`, both with salary 123456.
    pub async fn standard() -> Self {
        Self::start(standard_handler).await
    }

    pub fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

pub fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(value.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

pub fn standard_handler(request: &RecordedRequest) -> Response<Bytes> {
    match request.path.as_str() {
        "/users" => {
            let names = request.query_values("name");
            if names.is_empty() {
                return text_response(StatusCode::BAD_REQUEST, "Invalid parameters");
            }
            let users: Vec<_> = [(123456, "dip 太郎", 25), (234567, "dip 次郎", 25)]
                .into_iter()
                .filter(|(_, name, _)| names.iter().any(|n| n == *name))
                .map(|(id, name, age)| json!({"ID": id, "Name": name, "Age": age}))
                .collect();
            json_response(StatusCode::OK, json!(users))
        }
        "/entries" => {
            let ids = request.query_values("userID");
            if ids.is_empty() {
                return text_response(StatusCode::BAD_REQUEST, "Invalid parameters");
            }
            let rows = [("案件情報1", 123456, 123456), ("案件情報2", 234567, 123456)];
            let entries: Vec<_> = rows
                .into_iter()
                .filter(|(_, user_id, _)| ids.iter().any(|id| *id == user_id.to_string()))
                .map(|(name, user_id, salary)| {
                    json!({"Name": name, "UserID": user_id, "Salary": salary})
                })
                .collect();
            if entries.is_empty() {
                // nil slice on the downstream side
                json_response(StatusCode::OK, serde_json::Value::Null)
            } else {
                json_response(StatusCode::OK, json!(entries))
            }
        }
        _ => text_response(StatusCode::NOT_FOUND, "404 page not found"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
}

/// Accepts connections and never answers them
pub async fn start_unresponsive_server() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    Url::parse(&format!("http://{addr}")).unwrap()
}

/// URL of a local port nothing listens on
pub fn closed_port_url() -> Url {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    Url::parse(&format!("http://127.0.0.1:{port}")).unwrap()
}
