use crate::aggregator::Aggregator;
use crate::errors::GatewayError;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use http::{Method, StatusCode};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Request, Response};
use shared::http::{full_body, make_boxed_error_response};
use shared::{gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use tokio::time::Instant;

const CITY_PREFIX: &str = "/city/";

pub type GatewayResponse = Response<BoxBody<Bytes, GatewayError>>;

/// Serves `GET /city/{name}`.
pub struct GatewayService {
    aggregator: Aggregator,
}

impl GatewayService {
    pub fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = GatewayResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let aggregator = self.aggregator.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            let started = Instant::now();
            gauge!(REQUESTS_INFLIGHT).increment(1.0);

            let response = handle_request(&aggregator, &method, &path).await;

            gauge!(REQUESTS_INFLIGHT).decrement(1.0);
            histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_owned())
                .record(started.elapsed().as_secs_f64());
            Ok(response)
        })
    }
}

/// Routes a request and turns every failure into a response.
pub async fn handle_request(
    aggregator: &Aggregator,
    method: &Method,
    path: &str,
) -> GatewayResponse {
    let Some(raw_city) = path.strip_prefix(CITY_PREFIX) else {
        return make_boxed_error_response(StatusCode::NOT_FOUND);
    };
    if raw_city.contains('/') {
        return make_boxed_error_response(StatusCode::NOT_FOUND);
    }
    if *method != Method::GET {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let city = match urlencoding::decode(raw_city) {
        Ok(city) => city.into_owned(),
        Err(_) => return error_response(GatewayError::InvalidCity),
    };

    let composite = match aggregator.handle(&city).await {
        Ok(composite) => composite,
        Err(e) => return error_response(e),
    };

    match serde_json::to_vec(&composite) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(GatewayError::AggregationFailure(e.to_string())),
    }
}

fn error_response(error: GatewayError) -> GatewayResponse {
    let status = match error {
        GatewayError::InvalidCity => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    }

    let body = serde_json::json!({ "error": error.to_string() });
    json_response(status, body.to_string().into_bytes())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> GatewayResponse {
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::Chains;
    use crate::config::{ProviderUrls, test_secrets};
    use crate::testutils::ScriptedFetcher;
    use http_body_util::BodyExt;
    use serde_json::{Value as JsonValue, json};
    use std::sync::Arc;

    fn aggregator(fetcher: Arc<ScriptedFetcher>) -> Aggregator {
        let chains = Chains::from_config(&ProviderUrls::default(), &test_secrets()).unwrap();
        Aggregator::new(chains, fetcher)
    }

    async fn body_json(response: GatewayResponse) -> JsonValue {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let aggregator = aggregator(fetcher.clone());

        let response = handle_request(&aggregator, &Method::GET, "/weather/Paris").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_request(&aggregator, &Method::GET, "/city/Paris/extra").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_request(&aggregator, &Method::POST, "/city/Paris").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = handle_request(&aggregator, &Method::GET, "/city/%20%20").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "invalid city name"})
        );

        let response = handle_request(&aggregator, &Method::GET, "/city/").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_city_response() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(
            "https://en.wikipedia.org/api/rest_v1/page/summary/New%20York",
            json!({"title": "New York City", "extract": "The most populous city."}),
        ));
        let aggregator = aggregator(fetcher);

        let response = handle_request(&aggregator, &Method::GET, "/city/New%20York").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = body_json(response).await;
        assert_eq!(body["city"], "New York");
        assert_eq!(body["city_info"]["data"]["kind"], "encyclopedia");
        assert_eq!(
            body["city_info"]["source"],
            "https://en.wikipedia.org/api/rest_v1/page/summary/New%20York"
        );
        assert_eq!(body["weather"]["data"], "weather data unavailable");
    }
}
