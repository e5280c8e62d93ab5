use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use service_core::error::AppError;

use crate::{services::metrics::record_upstream_failure, startup::AppState};

const PUBLIC_PREFIX: &str = "/api";

/// Forward `/api/records...` to the data service's `/records...`.
///
/// Upstream 2xx-4xx replies are relayed verbatim. Anything that prevents a
/// usable reply becomes a 502 with a generic body.
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let upstream_path = path_and_query
        .strip_prefix(PUBLIC_PREFIX)
        .unwrap_or(path_and_query);

    match state
        .client
        .forward(method.clone(), upstream_path, &headers, body)
        .await
    {
        Ok(upstream) => {
            tracing::debug!(
                method = %method,
                path = upstream_path,
                status = upstream.status.as_u16(),
                "Forwarded request"
            );
            let mut response = (upstream.status, upstream.body).into_response();
            match upstream.content_type {
                Some(content_type) => {
                    response
                        .headers_mut()
                        .insert(header::CONTENT_TYPE, content_type);
                }
                None => {
                    response.headers_mut().remove(header::CONTENT_TYPE);
                }
            }
            Ok(response)
        }
        Err(e) => {
            let kind = e.kind();
            record_upstream_failure(kind);
            tracing::warn!(
                method = %method,
                path = upstream_path,
                classification = kind,
                error = %e,
                "Forwarding to data service failed"
            );
            Err(AppError::BadGateway(e.into()))
        }
    }
}
