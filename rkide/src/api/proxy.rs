use std::sync::Arc;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::state::AppState;

/// Largest request body passed on to the ide server.
const MAX_FORWARD_BODY: usize = 64 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = json!({
        "error": {
            "code": code,
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Any other route: pass the request through to the ready ide server.
pub async fn forward(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let Some(upstream) = state.upstream().await else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "NOT_READY",
            "ide server is not ready".to_string(),
        );
    };

    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{upstream}{path}");

    let body = match to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(body) => body,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "BODY",
                format!("read request body failed: {e}"),
            );
        }
    };
    let mut headers = parts.headers;
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);

    let resp = match state
        .http
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("Forward request to {url} failed: {e}");
            return error_response(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM",
                format!("forward request failed: {e}"),
            );
        }
    };

    let status = resp.status();
    let mut headers = resp.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
