// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP endpoint serving the exporter.
//!
//! `GET <telemetry path>` runs one collection and answers with the text
//! exposition. `GET /` answers a small landing page. Everything else is 404.
//! Scrapes are serialized, so a slow collection makes concurrent scrapers wait
//! instead of running a second collection next to it.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collector::Exporter;
use crate::error::Result;
use crate::metrics::TEXT_CONTENT_TYPE;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9677";

/// Default path of the metrics endpoint.
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";

/// Request handling shared by all connections.
pub struct MetricsService {
    exporter: Arc<Exporter>,
    telemetry_path: String,
    scrape_lock: Mutex<()>,
}

impl MetricsService {
    #[must_use]
    pub fn new(exporter: Arc<Exporter>, telemetry_path: impl Into<String>) -> Self {
        let mut telemetry_path = telemetry_path.into();
        if !telemetry_path.starts_with('/') {
            telemetry_path.insert(0, '/');
        }
        Self {
            exporter,
            telemetry_path,
            scrape_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn telemetry_path(&self) -> &str {
        &self.telemetry_path
    }

    /// Answer one request.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>> {
        let parts = request.into_parts().0;
        let path = parts.uri.path();

        if parts.method != Method::GET && parts.method != Method::HEAD {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "text/plain; charset=utf-8", "Method Not Allowed\n");
        }

        if path == self.telemetry_path {
            let body = {
                let _scrape = self.scrape_lock.lock().await;
                self.exporter.render().await
            };
            text_response(StatusCode::OK, TEXT_CONTENT_TYPE, body)
        } else if path == "/" {
            text_response(StatusCode::OK, "text/html; charset=utf-8", self.landing_page())
        } else {
            text_response(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found\n")
        }
    }

    fn landing_page(&self) -> String {
        format!(
            "<html>\n\
             <head><title>ECS Exporter</title></head>\n\
             <body>\n\
             <h1>ECS Exporter</h1>\n\
             <p><a href='{}'>Metrics</a></p>\n\
             </body>\n\
             </html>\n",
            self.telemetry_path
        )
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}

/// Bind `address` and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error when the address cannot be bound.
pub async fn serve<F>(address: SocketAddr, service: Arc<MetricsService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, path = %service.telemetry_path(), "listening");
    serve_listener(listener, service, shutdown).await
}

/// Serve connections from an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Currently infallible once bound; accept errors are logged and skipped.
pub async fn serve_listener<F>(listener: TcpListener, service: Arc<MetricsService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            let handler = service_fn(move |request: Request<Incoming>| {
                let service = service.clone();
                async move { Ok::<_, Infallible>(service.handle(request).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), handler)
                .await
            {
                if !e.is_incomplete_message() {
                    debug!(remote = %remote, error = %e, "connection error");
                }
            }
        });
    }
}
