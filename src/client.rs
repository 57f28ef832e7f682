//! Client for a running lookup server

use crate::protocol::{decode, encode, ProtocolError, Request, Response};
use crate::service::Method;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default timeout for connecting and for each response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors seen by the client
#[derive(Debug)]
pub enum ClientError {
    /// The server did not answer in time
    Timeout,
    /// Framing or socket failure
    Protocol(ProtocolError),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Timeout => write!(f, "Request timed out"),
            ClientError::Protocol(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Timeout => None,
            ClientError::Protocol(e) => Some(e),
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Protocol(err)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Protocol(ProtocolError::Io(err))
    }
}

/// A persistent connection to a server
///
/// Requests are sent one at a time and answered in order.
pub struct Client {
    stream: TcpStream,
    buf: BytesMut,
    timeout: Duration,
}

impl Client {
    /// Connect with the default timeout
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT).await
    }

    /// Connect with a custom timeout, also used for every response
    pub async fn connect_with_timeout(
        addr: SocketAddr,
        timeout_duration: Duration,
    ) -> Result<Self, ClientError> {
        let stream = timeout(timeout_duration, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;

        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            timeout: timeout_duration,
        })
    }

    /// Send a request and wait for its response
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        let data = encode(request)?;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;

        let mut read_buf = [0u8; 1024];
        loop {
            if let Some(response) = decode::<Response>(&mut self.buf)? {
                return Ok(response);
            }

            let n = timeout(self.timeout, self.stream.read(&mut read_buf))
                .await
                .map_err(|_| ClientError::Timeout)??;

            if n == 0 {
                return Err(ProtocolError::UnexpectedEof.into());
            }
            self.buf.extend_from_slice(&read_buf[..n]);
        }
    }

    /// Shorthand for [`Client::send`]
    pub async fn query(
        &mut self,
        method: Method,
        ip: impl Into<String>,
    ) -> Result<Response, ClientError> {
        self.send(&Request::new(method, ip)).await
    }
}
