use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;

pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod ledger;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod redis_client;
pub mod review_worker;
pub mod sentiment;
pub mod utils;

use config::{LogFormat, LoggingConfig};
use db::DbPool;
use redis_client::RedisHandle;

type HttpResult = Result<Response<Full<Bytes>>, Infallible>;

/// Install the global tracing subscriber.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.rust_log)
        .with_context(|| format!("Invalid RUST_LOG directive {:?}", logging.rust_log))?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    }
    .context("Failed to install tracing subscriber")
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from(body)));
    *res.status_mut() = status;
    res
}

async fn http_handler(
    req: Request<IncomingBody>,
    db_pool: Arc<DbPool>,
    redis: Arc<RedisHandle>,
) -> HttpResult {
    let response = match req.uri().path() {
        "/health" => match health::health_check(&db_pool, &redis).await {
            Ok(_) => text_response(StatusCode::OK, "OK"),
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Health check failed");
                text_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
        },
        "/metrics" => match metrics::gather_metrics() {
            Ok(metrics_data) => {
                let mut res = Response::new(Full::new(Bytes::from(metrics_data)));
                res.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                res
            }
            Err(e) => {
                tracing::error!("Failed to gather metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

/// Serve `/health` and `/metrics` until the listener fails.
pub async fn run_http_server(
    port: u16,
    db_pool: Arc<DbPool>,
    redis: Arc<RedisHandle>,
) -> Result<()> {
    let http_addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind health listener on {}", http_addr))?;
    tracing::info!("HTTP server listening on http://{}", http_addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        let db_pool_clone = db_pool.clone();
        let redis_clone = redis.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                http_handler(req, db_pool_clone.clone(), redis_clone.clone())
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Error serving HTTP connection: {:?}", err);
            }
        });
    }
}
