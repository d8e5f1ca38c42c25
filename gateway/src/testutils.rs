use crate::config::Environment;
use crate::errors::{FetchError, FetchFailure};
use crate::fetcher::Fetch;
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::USER_AGENT;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::Value as JsonValue;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Canned answer for one path of a [`MockUpstream`].
#[derive(Clone, Debug)]
pub enum MockRoute {
    Json(JsonValue),
    Text(String),
    Status(u16),
    Delayed(Duration, JsonValue),
}

impl MockRoute {
    pub fn json(value: JsonValue) -> Self {
        MockRoute::Json(value)
    }

    pub fn text(body: &str) -> Self {
        MockRoute::Text(body.to_string())
    }

    pub fn status(code: u16) -> Self {
        MockRoute::Status(code)
    }

    pub fn delayed(delay: Duration, value: JsonValue) -> Self {
        MockRoute::Delayed(delay, value)
    }

    async fn respond(&self) -> Response<Full<Bytes>> {
        match self {
            MockRoute::Json(value) => json_response(value),
            MockRoute::Text(body) => Response::new(Full::new(Bytes::from(body.clone()))),
            MockRoute::Status(code) => {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() =
                    StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                response
            }
            MockRoute::Delayed(delay, value) => {
                tokio::time::sleep(*delay).await;
                json_response(value)
            }
        }
    }
}

fn json_response(value: &JsonValue) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap();
    Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[derive(Default)]
struct Recorded {
    hits: HashMap<String, usize>,
    user_agents: Vec<String>,
}

/// Local HTTP server that routes on the request path only, so it also works as
/// a plain forward proxy for absolute-form requests. Unknown paths get a 404.
pub struct MockUpstream {
    port: u16,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockUpstream {
    pub async fn start(routes: Vec<(&str, MockRoute)>) -> Self {
        let routes: Arc<HashMap<String, MockRoute>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server_recorded = recorded.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let routes = routes.clone();
                let recorded = server_recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let routes = routes.clone();
                        let recorded = recorded.clone();
                        async move {
                            let path = req.uri().path().to_string();
                            {
                                let mut recorded = recorded.lock().unwrap();
                                *recorded.hits.entry(path.clone()).or_default() += 1;
                                if let Some(ua) = req
                                    .headers()
                                    .get(USER_AGENT)
                                    .and_then(|v| v.to_str().ok())
                                {
                                    recorded.user_agents.push(ua.to_string());
                                }
                            }

                            let response = match routes.get(&path) {
                                Some(route) => route.respond().await,
                                None => MockRoute::Status(404).respond().await,
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockUpstream { port, recorded }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute URL for `path_and_query` on this server.
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path_and_query)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.recorded.lock().unwrap().user_agents.clone()
    }
}

/// In-memory [`Fetch`] with per-URL answers and a call log.
///
/// URLs without a scripted answer fail with a 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    answers: HashMap<String, Option<JsonValue>>,
    panics: bool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, value: JsonValue) -> Self {
        self.answers.insert(url.to_string(), Some(value));
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.answers.insert(url.to_string(), None);
        self
    }

    /// Makes every fetch panic.
    pub fn panicking() -> Self {
        ScriptedFetcher {
            panics: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, url: &str) -> bool {
        self.calls().iter().any(|c| c == url)
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Arc<JsonValue>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.panics {
            panic!("scripted fetcher panic for {url}");
        }

        match self.answers.get(url) {
            Some(Some(value)) => Ok(Arc::new(value.clone())),
            Some(None) => Err(FetchError::FetchFailed {
                url: url.to_string(),
                environment: Environment::Production,
                reason: FetchFailure::Status(500),
            }),
            None => Err(FetchError::FetchFailed {
                url: url.to_string(),
                environment: Environment::Production,
                reason: FetchFailure::Status(404),
            }),
        }
    }
}

/// Recorder that keeps counter totals and drops everything else.
///
/// Counters are keyed by name, followed by `,key=value` for each label.
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    pub fn count(&self, id: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(id)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let mut id = key.name().to_string();
        for label in key.labels() {
            id.push_str(&format!(",{}={}", label.key(), label.value()));
        }
        let counter = self.counters.lock().unwrap().entry(id).or_default().clone();
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Drives `future` on a current-thread runtime with a [`CountingRecorder`]
/// installed for this thread only.
pub fn run_recorded<F: Future>(future: F) -> (F::Output, CountingRecorder) {
    let recorder = CountingRecorder::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let output = metrics::with_local_recorder(&recorder, || runtime.block_on(future));
    (output, recorder)
}
