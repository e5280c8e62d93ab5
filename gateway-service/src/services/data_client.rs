//! HTTP client for the internal data service.

use crate::config::ForwardConfig;
use crate::services::retry::retry_call;
use async_trait::async_trait;
use axum::body::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use service_core::lifecycle::ManagedResource;
use service_core::observability::{
    extract_request_id, inject_trace_headers, TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Inbound headers passed on to the data service.
const FORWARDED_HEADERS: [&str; 5] = [
    "content-type",
    "accept",
    "x-request-id",
    TRACEPARENT_HEADER,
    TRACESTATE_HEADER,
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("data service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("data service call timed out after {0:?}")]
    Timeout(Duration),

    #[error("data service responded with {0}")]
    UpstreamStatus(StatusCode),

    #[error("invalid data service response: {0}")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("data service client is closed")]
    Closed,
}

impl ForwardError {
    /// Classification used in logs and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Unreachable(_) | ForwardError::Closed => "unreachable",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::UpstreamStatus(_) | ForwardError::InvalidResponse(_) => "upstream_error",
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardError::Unreachable(_) | ForwardError::Timeout(_))
    }
}

/// Upstream reply relayed to the client as-is.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

pub struct DataServiceClient {
    client: reqwest::Client,
    config: ForwardConfig,
    closed: AtomicBool,
}

impl DataServiceClient {
    pub fn new(config: ForwardConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Forward one request. `path_and_query` is relative to the data
    /// service root. Upstream 5xx replies come back as `UpstreamStatus`.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, ForwardError> {
        let url = format!("{}{}", self.config.base_url, path_and_query);
        let headers = outbound_headers(inbound);
        let timeout = self.config.request_timeout;

        let call = || {
            self.send(
                method.clone(),
                &url,
                headers.clone(),
                body.clone(),
                timeout,
            )
        };

        if method == Method::GET {
            retry_call(
                &self.config.retry,
                "forward",
                ForwardError::is_retryable,
                call,
            )
            .await
        } else {
            call().await
        }
    }

    /// Probe the data service health endpoint under the health timeout.
    pub async fn probe_health(&self) -> Result<(), ForwardError> {
        let url = format!("{}{}", self.config.base_url, self.config.health_path);
        let response = self
            .send(
                Method::GET,
                &url,
                HeaderMap::new(),
                Bytes::new(),
                self.config.health_timeout,
            )
            .await?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(ForwardError::UpstreamStatus(response.status))
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> Result<UpstreamResponse, ForwardError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ForwardError::Closed);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ForwardError::Timeout(timeout)
            } else {
                ForwardError::Unreachable(e)
            }
        };

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ForwardError::Timeout(timeout)
            } else {
                ForwardError::InvalidResponse(e)
            }
        })?;

        if status.is_server_error() {
            return Err(ForwardError::UpstreamStatus(status));
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Copy the allow-listed inbound headers and stamp the current trace context.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = inbound.get(name) {
            headers.insert(name, value.clone());
        }
    }
    inject_trace_headers(&mut headers, extract_request_id(inbound).as_deref());
    headers
}

#[async_trait]
impl ManagedResource for DataServiceClient {
    fn name(&self) -> &str {
        "data-service-client"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
