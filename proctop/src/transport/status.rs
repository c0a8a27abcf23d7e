use crate::sink::board::GaugeBoard;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serves `/healthz` and the gauge board at `/metrics` on localhost.
pub async fn spawn_status_server(port: u16, board: GaugeBoard) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status server on {addr}"))?;
    let local = listener.local_addr()?;
    info!(addr = %local, "status server listening");
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = ?e, "status accept failed");
                    continue;
                }
            };
            let board = board.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req| {
                    let board = board.clone();
                    async move { Ok::<_, Infallible>(handle(req, &board)) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await
                {
                    warn!(error = ?e, "status connection error");
                }
            });
        }
    });
    Ok(local)
}

fn handle(req: Request<Incoming>, board: &GaugeBoard) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => (200, "text/plain", "ok".to_string()),
        (&Method::GET, "/metrics") => (
            200,
            "text/plain; version=0.0.4",
            board.render_prometheus(),
        ),
        _ => (404, "text/plain", String::new()),
    };
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::OK);
    if let Ok(v) = hyper::header::HeaderValue::from_str(content_type) {
        resp.headers_mut().insert(hyper::header::CONTENT_TYPE, v);
    }
    resp
}
