use std::{fmt, sync::Arc, time::Duration};

use crate::{
    identifiers::Network,
    types::PluginType,
    RetryMetadata,
};

/// User-provided callbacks for emitting metrics without taking on a metrics dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub aggregation: Option<Arc<dyn Fn(AggregationMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field("aggregation", &self.aggregation.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Request metadata attached to HTTP telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    /// GraphQL operation name.
    pub operation: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub retries: Option<RetryMetadata>,
    pub context: RequestContext,
}

/// Outcome of one creator-proposals aggregation.
///
/// `identifiers - resolved` is the number of identifiers whose detail lookup
/// came back absent.
#[derive(Clone, Debug)]
pub struct AggregationMetrics {
    pub plugin_type: PluginType,
    pub network: Network,
    pub identifiers: usize,
    pub resolved: usize,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn record_aggregation(&self, metrics: AggregationMetrics) {
        if let Some(cb) = &self.callbacks.aggregation {
            cb(metrics);
        }
    }
}
