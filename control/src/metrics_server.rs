//! Prometheus scrape endpoint
//!
//! Plain HTTP/1 listener serving the controller registry on `GET /metrics`
//! and a health check on `GET /healthz`.

use crate::apis::metrics::gather_controller_metrics;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accept scrape connections on `bind_addr` until the task is aborted
pub async fn serve_metrics(bind_addr: &str) -> Result<(), String> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("📊 Metrics listening on {}", bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!("Accepted metrics connection from {}", peer_addr);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service_fn(handle_request::<Incoming>))
                        .await
                    {
                        debug!("Metrics connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error on {}: {}", bind_addr, e);
            }
        }
    }
}

async fn handle_request<B>(req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    if *req.method() != Method::GET {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            "method not allowed",
        ));
    }

    let response = match req.uri().path() {
        "/metrics" => match gather_controller_metrics() {
            Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, text),
            Err(e) => {
                error!("{}", e);
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e)
            }
        },
        "/healthz" => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(response)
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
