use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Inbound request duration in seconds. Tagged with route, status.",
};

pub const DOWNSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "downstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of one downstream call in seconds. Tagged with outcome.",
};

pub const USER_NOT_FOUND: MetricDef = MetricDef {
    name: "entries.user_not_found",
    metric_type: MetricType::Counter,
    description: "Number of entries lookups whose name matched no user",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    DOWNSTREAM_REQUEST_DURATION,
    USER_NOT_FOUND,
];
