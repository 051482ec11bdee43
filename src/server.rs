//! Bundled hyper host and graceful shutdown.
//!
//! The dispatcher itself is synchronous and transport-agnostic. This module
//! is one host for it: it accepts connections, turns each hyper request into
//! a [`Request`], runs [`Dispatcher::dispatch`] on tokio's blocking pool so a
//! slow hook or responder only occupies its own thread, and writes the
//! [`Response`] back. A streamed body is read chunk by chunk on the blocking
//! pool and forwarded as it arrives.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (or Ctrl-C) the server:
//! 1. Stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::app::App;
use crate::dispatch::Dispatcher;
use crate::error::ServeError;
use crate::method::Method;
use crate::request::{Body, Request};
use crate::response::{Payload, Response};

/// Body type handed to hyper: buffered bytes or a forwarded stream.
type HttpBody = UnsyncBoxBody<Bytes, io::Error>;

/// Read size for streamed bodies.
const STREAM_CHUNK: usize = 16 * 1024;
/// Chunks buffered between the reader thread and the connection.
const STREAM_BUFFER: usize = 4;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use roost::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, ServeError> {
        Ok(Self { addr: addr.parse()? })
    }

    /// Builds `app` and serves it until a shutdown signal arrives and every
    /// in-flight request has completed.
    pub async fn serve(self, app: App) -> Result<(), ServeError> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, Arc::new(app.build()), shutdown_signal()).await
    }
}

/// Accept loop over an already-bound listener, stopping when `shutdown`
/// resolves.
pub(crate) async fn serve_listener(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServeError> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "roost listening");

    // Every spawned connection task, so shutdown can wait for them all.
    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so a SIGTERM stops accepting immediately,
            // even with more connections queued.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let dispatcher = Arc::clone(&dispatcher);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| handle(Arc::clone(&dispatcher), req));

                    // HTTP/1.1 and HTTP/2, whichever the client negotiates.
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished tasks so the set does not grow without bound.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("roost stopped");
    Ok(())
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Hot path: one hyper request in, one response out.
///
/// Every failure is turned into a response here, so hyper never sees an error.
async fn handle(
    dispatcher: Arc<Dispatcher>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<HttpBody>, Infallible> {
    let (parts, incoming) = req.into_parts();

    let Ok(method) = Method::try_from(&parts.method) else {
        return Ok(bare(http::StatusCode::NOT_IMPLEMENTED));
    };

    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Ok(bare(http::StatusCode::BAD_REQUEST));
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_owned(), |pq| pq.as_str().to_owned());

    let result = tokio::task::spawn_blocking(move || {
        let request = Request::with_options(
            method,
            &target,
            parts.headers,
            Body::from_bytes(body),
            &dispatcher.config().request,
        );
        dispatcher.dispatch(request)
    })
    .await;

    match result {
        Ok(resp) => Ok(into_hyper(resp)),
        Err(e) => {
            error!("dispatch task failed: {e}");
            Ok(bare(http::StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn into_hyper(resp: Response) -> http::Response<HttpBody> {
    let (status, headers, payload) = resp.into_parts();
    let body = match payload {
        Payload::Bytes(bytes) => full(bytes),
        Payload::Stream(reader) => {
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);
            tokio::task::spawn_blocking(move || pump(reader, tx));
            StreamBody::new(ReceiverStream::new(rx)).boxed_unsync()
        }
    };
    let mut out = http::Response::new(body);
    *out.status_mut() = status.into();
    *out.headers_mut() = headers;
    out
}

/// Forwards `reader` into the body channel until EOF, a read error or the
/// client going away.
fn pump(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<io::Result<Frame<Bytes>>>) {
    let mut buf = vec![0; STREAM_CHUNK];
    loop {
        let frame = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Frame::data(Bytes::copy_from_slice(&buf[..n]))),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("response stream failed: {e}");
                Err(e)
            }
        };
        let failed = frame.is_err();
        if tx.blocking_send(frame).is_err() || failed {
            return;
        }
    }
}

fn full(bytes: Bytes) -> HttpBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn bare(status: http::StatusCode) -> http::Response<HttpBody> {
    let mut resp = http::Response::new(full(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT. On Windows only Ctrl-C exists.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // Never resolves, so the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
