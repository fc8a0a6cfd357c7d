use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::BoxFuture;
use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE},
    Method,
};
use serde::Deserialize;
use tokio::time::sleep;

use crate::{
    errors::{
        Error, GraphQlError, QueryExecutionError, Result, RetryMetadata, TransportError,
        TransportErrorKind,
    },
    http::{
        parse_http_error, request_id_from_headers, HeaderList, RequestOptions, RetryConfig,
        RetryState,
    },
    indexer::{GraphQlRequest, IndexerTransport},
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
    CLIENT_HEADER, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    REQUEST_ID_HEADER,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// GraphQL endpoint of the indexer (e.g. a subgraph query URL). Required.
    pub endpoint: Option<String>,
    /// Sent as a bearer token (hosted gateways require one).
    pub api_key: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 30s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy (defaults to 3 attempts, exponential backoff + jitter).
    pub retry: Option<RetryConfig>,
    /// Extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    pub metrics: Option<MetricsCallbacks>,
}

/// HTTP GraphQL client for the governance indexer.
#[derive(Clone)]
pub struct IndexerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: reqwest::Url,
    api_key: Option<String>,
    client_header: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

#[derive(Deserialize)]
struct GraphQlEnvelope {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

impl IndexerClient {
    pub fn new(cfg: Config) -> Result<Self> {
        let endpoint = cfg
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("indexer endpoint is required".to_string()))?;
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|err| Error::Config(format!("invalid indexer endpoint: {err}")))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                    retries: None,
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                api_key: cfg.api_key.filter(|s| !s.trim().is_empty()),
                client_header,
                http,
                request_timeout,
                retry: cfg.retry.unwrap_or_default(),
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.inner.endpoint
    }

    /// Executes a GraphQL document and returns its `data` object.
    pub async fn execute(
        &self,
        request: &GraphQlRequest,
        options: RequestOptions,
    ) -> Result<serde_json::Value> {
        let mut builder = self
            .inner
            .http
            .request(Method::POST, self.inner.endpoint.clone())
            .json(request);
        builder = self
            .inner
            .with_headers(builder, options.request_id.as_deref(), &options.headers)?;
        builder = builder.timeout(options.timeout.unwrap_or(self.inner.request_timeout));

        let retry = options
            .retry
            .clone()
            .unwrap_or_else(|| self.inner.retry.clone());
        let ctx = RequestContext::new(Method::POST.as_str(), self.inner.endpoint.path())
            .with_operation(request.operation_name)
            .with_request_id(options.request_id.clone());

        let resp = self.inner.send_with_retry(builder, retry, ctx).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| to_transport_error(err, None))?;
        let envelope: GraphQlEnvelope =
            serde_json::from_slice(&bytes).map_err(QueryExecutionError::from)?;

        if !envelope.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                operation = request.operation_name,
                errors = envelope.errors.len(),
                "indexer returned graphql errors"
            );
            return Err(QueryExecutionError::GraphQl(envelope.errors).into());
        }
        match envelope.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(QueryExecutionError::Malformed("response has no data".to_string()).into()),
        }
    }
}

impl IndexerTransport for IndexerClient {
    fn request(&self, request: GraphQlRequest) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move { self.execute(&request, RequestOptions::default()).await })
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

impl ClientInner {
    fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        request_id: Option<&str>,
        headers: &HeaderList,
    ) -> Result<reqwest::RequestBuilder> {
        builder = builder
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(req_id) = request_id {
            if !req_id.trim().is_empty() {
                builder = builder.header(REQUEST_ID_HEADER, req_id);
            }
        }
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header(CLIENT_HEADER, client_header);
        }
        if let Some(key) = &self.api_key {
            let bearer = key
                .trim()
                .strip_prefix("Bearer ")
                .unwrap_or(key.trim());
            builder = builder.bearer_auth(bearer);
        }
        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        apply_header_list(builder, headers)
    }

    async fn send_with_retry(
        &self,
        builder: reqwest::RequestBuilder,
        retry: RetryConfig,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let max_attempts = retry.max_attempts.max(1);
        let mut state = RetryState::new();
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            let attempt_builder = builder
                .try_clone()
                .ok_or_else(|| Error::Config("request body is not cloneable for retry".into()))?;
            #[cfg(feature = "tracing")]
            let result = {
                use tracing::Instrument;
                let span = tracing::debug_span!(
                    "creator_proposals.http",
                    operation = ctx.operation.as_deref().unwrap_or_default(),
                    attempt,
                    max_attempts
                );
                attempt_builder.send().instrument(span).await
            };
            #[cfg(not(feature = "tracing"))]
            let result = attempt_builder.send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        state.record_attempt(attempt);
                        if self.telemetry.http_enabled() {
                            let mut http_ctx = ctx.clone();
                            if http_ctx.request_id.is_none() {
                                http_ctx.request_id = request_id_from_headers(resp.headers());
                            }
                            self.telemetry.record_http(HttpRequestMetrics {
                                latency: start.elapsed(),
                                status: Some(status.as_u16()),
                                error: None,
                                retries: state.metadata(),
                                context: http_ctx,
                            });
                        }
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            status = %status,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "request completed"
                        );
                        return Ok(resp);
                    }
                    state.record_attempt(attempt);
                    state.record_status(status);

                    if retry.should_retry_status(status) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    let headers = resp.headers().clone();
                    if self.telemetry.http_enabled() {
                        let mut http_ctx = ctx.clone();
                        if http_ctx.request_id.is_none() {
                            http_ctx.request_id = request_id_from_headers(&headers);
                        }
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: Some(status.as_u16()),
                            error: Some(format!("http {}", status.as_u16())),
                            retries: retries.clone(),
                            context: http_ctx,
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(status = %status, attempt, "request failed; returning error");
                    let body = resp.text().await.unwrap_or_default();
                    return Err(parse_http_error(status, &headers, body, retries).into());
                }
                Err(err) => {
                    state.record_attempt(attempt);
                    state.record_error(&err);
                    if retry.should_retry_error(&err) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: None,
                            error: Some(err.to_string()),
                            retries: retries.clone(),
                            context: ctx.clone(),
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "transport error");
                    return Err(to_transport_error(err, retries));
                }
            }
        }

        Err(TransportError {
            kind: TransportErrorKind::Other,
            message: "request failed".to_string(),
            source: None,
            retries: state.metadata(),
        }
        .into())
    }
}

fn to_transport_error(err: reqwest::Error, retries: Option<RetryMetadata>) -> Error {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };

    TransportError {
        kind,
        message: err.to_string(),
        source: Some(err),
        retries,
    }
    .into()
}
