use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Method {
    #[strum(serialize = "GET")]
    Get,
    #[strum(serialize = "POST")]
    Post,
    #[strum(serialize = "PUT")]
    Put,
    #[strum(serialize = "DELETE")]
    Delete,
}

/// A backend call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Sends one request and hands back the raw status and body.
/// Non-2xx statuses are responses, not errors; only I/O failures are `Err`.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
        let url = self.url_for(&request.path);
        let client = self.client.clone();
        async move {
            log::debug!("{} {url}", request.method);
            let mut rq = match request.method {
                Method::Get => client.get(&url),
                Method::Post => client.post(&url),
                Method::Put => client.put(&url),
                Method::Delete => client.delete(&url),
            };
            if !request.query.is_empty() {
                rq = rq.query(&request.query);
            }
            if let Some(token) = &request.bearer {
                rq = rq.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Some(body) = &request.body {
                rq = rq.header(CONTENT_TYPE, "application/json").json(body);
            }
            let response = rq.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            log::debug!("{} {url} -> {status}", request.method);
            Ok(HttpResponse { status, body })
        }
    }
}

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync;

/// Scripted in-process backend for tests and offline demos.
///
/// Every request is recorded; the handler decides the response. Paths
/// registered with [`MockTransport::with_latency`] are delayed, which lets
/// tests hold a refresh exchange open while other requests pile up.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    latency: Arc<Vec<(String, Duration)>>,
    log: Arc<Mutex<VecDeque<HttpRequest>>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            latency: Arc::new(Vec::new()),
            log: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_latency(mut self, path: &str, delay: Duration) -> Self {
        Arc::make_mut(&mut self.latency).push((path.to_string(), delay));
        self
    }

    /// All requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
        async move {
            if let Ok(mut log) = self.log.lock() {
                log.push_back(request.clone());
            }
            let delay = self
                .latency
                .iter()
                .find(|(path, _)| *path == request.path)
                .map(|(_, d)| *d);
            match delay {
                Some(d) => tokio::time::sleep(d).await,
                None => tokio::task::yield_now().await,
            }
            (self.handler)(&request)
        }
    }
}
