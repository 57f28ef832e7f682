//! TCP front end for the lookup service
//!
//! Each accepted connection gets its own task. A connection carries any
//! number of request frames, answered in order. A frame that cannot be
//! decoded is answered with `PROTOCOL_ERROR` and the connection is closed.

use crate::protocol::{decode, encode, Request, Response, PROTOCOL_ERROR_CODE};
use crate::service::GeoIpService;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// A bound listener plus the service it answers with
pub struct Server {
    listener: TcpListener,
    service: Arc<GeoIpService>,
}

impl Server {
    /// Bind a listening socket
    pub async fn bind(addr: SocketAddr, service: Arc<GeoIpService>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, service))
    }

    /// Serve on an already bound listener
    pub fn from_listener(listener: TcpListener, service: Arc<GeoIpService>) -> Self {
        Self { listener, service }
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes
    ///
    /// Connections already accepted finish on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, "listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let service = Arc::clone(&self.service);
                            tokio::spawn(async move {
                                handle_connection(stream, &service).await;
                                debug!(%peer, "connection closed");
                            });
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Resolves on SIGINT (ctrl-c)
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
}

/// Answer a single decoded request
pub fn handle_request(service: &GeoIpService, request: &Request) -> Response {
    let result = service.call(request.method, &request.to_ip_request());
    if let Err(e) = &result {
        debug!(method = %request.method, ip = %request.ip, code = e.code(), "query failed");
    }
    result.into()
}

async fn send_response<S>(stream: &mut S, response: &Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let data = encode(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    stream.write_all(&data).await?;
    stream.flush().await
}

/// Serve one connection until the peer disconnects or misbehaves
pub async fn handle_connection<S>(mut stream: S, service: &GeoIpService)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 1024];

    loop {
        match stream.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&read_buf[..n]),
            Err(e) => {
                debug!("read error: {}", e);
                break;
            }
        }

        loop {
            match decode::<Request>(&mut buf) {
                Ok(Some(request)) => {
                    let response = handle_request(service, &request);
                    if let Err(e) = send_response(&mut stream, &response).await {
                        error!("Failed to send response: {}", e);
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("protocol error: {}", e);
                    let response = Response::Error {
                        code: PROTOCOL_ERROR_CODE.to_string(),
                        message: e.to_string(),
                    };
                    let _ = send_response(&mut stream, &response).await;
                    return;
                }
            }
        }
    }
}
