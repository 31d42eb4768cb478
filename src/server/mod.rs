//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler.
//! Connections are persistent (keep-alive) unless the client asks otherwise.
//! [`Server::run_until`] stops accepting on a shutdown signal and gives open
//! connections a grace period to finish the request they are serving.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request head we buffer before rejecting it.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Default cap on a request body.
const DEFAULT_MAX_BODY: usize = 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use imgresize::server::Server;
/// use imgresize::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:4000").await?;
///     server
///         .run_until(
///             |_req| async { Response::new(StatusCode::Ok).body("ok\n") },
///             async { let _ = tokio::signal::ctrl_c().await; },
///             Duration::from_secs(10),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_body: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_body: DEFAULT_MAX_BODY,
        })
    }

    /// Caps the accepted `Content-Length`; larger requests get `413`.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` resolves, then drains open connections.
    ///
    /// After the signal no new connection is accepted. Idle connections close
    /// at once; a connection in the middle of a request finishes it first.
    /// Whatever is still running after `grace` is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S, grace: Duration) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        let handler = Arc::new(handler);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        info!(address = %self.local_addr, "listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let conn = Connection {
                        peer_addr,
                        max_body: self.max_body,
                        stop: stop_rx.clone(),
                    };
                    let handler = Arc::clone(&handler);

                    connections.spawn(async move {
                        if let Err(e) = conn.serve(stream, handler).await {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                // Reap finished connections so the set stays small.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "shutting down server");
        drop(self.listener);
        let _ = stop_tx.send(true);

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = connections.len(), "graceful shutdown timed out, aborting connections");
            connections.abort_all();
        }

        Ok(())
    }
}

struct Connection {
    peer_addr: SocketAddr,
    max_body: usize,
    stop: watch::Receiver<bool>,
}

impl Connection {
    async fn reject(stream: &mut TcpStream, status: StatusCode, message: String) -> std::io::Result<()> {
        let response = Response::error(status, message).keep_alive(false);
        stream.write_all(&response.into_bytes()).await
    }

    /// Serves requests on one connection until the peer leaves, asks to
    /// close, or the server stops while the connection is idle.
    async fn serve<H, F>(mut self, mut stream: TcpStream, handler: Arc<H>) -> std::io::Result<()>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let peer_addr = self.peer_addr;
        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

        loop {
            if *self.stop.borrow() && buf.is_empty() {
                break;
            }

            let bytes_read = tokio::select! {
                read = stream.read_buf(&mut buf) => read?,
                _ = self.stop.changed(), if buf.is_empty() => break,
            };

            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }

            let (request, body_offset) = match Request::parse(&buf) {
                Ok(pair) => pair,
                Err(RequestError::Incomplete) if buf.len() <= MAX_HEAD_SIZE => continue,
                Err(RequestError::Incomplete) => {
                    warn!(peer = %peer_addr, "request head too large");
                    Self::reject(&mut stream, StatusCode::PayloadTooLarge, "request head too large".into()).await?;
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request");
                    Self::reject(&mut stream, StatusCode::BadRequest, format!("bad request: {e}")).await?;
                    break;
                }
            };

            let content_length = match request.content_length() {
                Ok(len) => len,
                Err(e) => {
                    Self::reject(&mut stream, StatusCode::BadRequest, e.to_string()).await?;
                    break;
                }
            };

            if content_length > self.max_body {
                warn!(peer = %peer_addr, content_length, "request body too large");
                Self::reject(&mut stream, StatusCode::PayloadTooLarge, "request body too large".into()).await?;
                break;
            }

            let total = body_offset + content_length;
            if buf.len() < total {
                continue;
            }

            let mut consumed = buf.split_to(total);
            let body = consumed.split_off(body_offset).freeze();
            let request = request.with_body(body);
            let keep_alive = request.is_keep_alive() && !*self.stop.borrow();

            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let response = handler(request).await.keep_alive(keep_alive);
            stream.write_all(&response.into_bytes()).await?;
            stream.flush().await?;

            if !keep_alive {
                break;
            }
        }

        Ok(())
    }
}
