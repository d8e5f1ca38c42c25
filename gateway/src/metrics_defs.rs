use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Response cache lookups that found a live entry",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Response cache lookups that found nothing or an expired entry",
};

pub const PROXY_PROBE_SUCCESS: MetricDef = MetricDef {
    name: "proxy.probe.success",
    metric_type: MetricType::Counter,
    description: "Proxy candidates that passed the liveness probe",
};

pub const PROXY_PROBE_FAILURE: MetricDef = MetricDef {
    name: "proxy.probe.failure",
    metric_type: MetricType::Counter,
    description: "Proxy candidates that failed the liveness probe",
};

pub const UPSTREAM_FETCH_DURATION: MetricDef = MetricDef {
    name: "upstream.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent on upstream fetches that missed the cache, in seconds",
};

pub const UPSTREAM_FETCH_FAILURES: MetricDef = MetricDef {
    name: "upstream.fetch.failures",
    metric_type: MetricType::Counter,
    description: "Upstream fetches that timed out, errored or returned a bad payload",
};

pub const CATEGORY_UNAVAILABLE: MetricDef = MetricDef {
    name: "category.unavailable",
    metric_type: MetricType::Counter,
    description: "Categories answered with a placeholder. Tagged with category.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    CACHE_HIT,
    CACHE_MISS,
    PROXY_PROBE_SUCCESS,
    PROXY_PROBE_FAILURE,
    UPSTREAM_FETCH_DURATION,
    UPSTREAM_FETCH_FAILURES,
    CATEGORY_UNAVAILABLE,
];
