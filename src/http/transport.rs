//! Single-exchange transport
//!
//! A `Transport` executes exactly one request and hands back the status and
//! body without following redirects. `NetTransport` opens a fresh TCP (and,
//! for `https`, TLS) connection for every exchange.

use super::session::{FdSessionOps, PollEvents};
use super::tls::{TlsConfig, TlsSessionOps};
use super::{Error, HttpClient, HttpRequest, RawResponse, Result, SessionOps};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Default per-I/O timeout
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes one HTTP exchange
pub trait Transport {
    /// Send `request` and read its response, giving up at `deadline`
    fn execute(&mut self, request: &HttpRequest, deadline: Option<Instant>) -> Result<RawResponse>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn execute(&mut self, request: &HttpRequest, deadline: Option<Instant>) -> Result<RawResponse> {
        (**self).execute(request, deadline)
    }
}

/// Plain or encrypted connection
enum Connection {
    Plain(FdSessionOps),
    Tls(Box<TlsSessionOps>),
}

impl SessionOps for Connection {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        match self {
            Connection::Plain(s) => s.poll(events, timeout),
            Connection::Tls(s) => s.poll(events, timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::Tls(s) => s.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::Tls(s) => s.write(buf),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Connection::Plain(s) => s.close(),
            Connection::Tls(s) => s.close(),
        }
    }
}

/// Network transport over TCP and TLS
pub struct NetTransport {
    tls: TlsConfig,
    io_timeout: Duration,
}

impl NetTransport {
    /// Create a transport with certificate verification disabled
    pub fn new() -> Result<Self> {
        Ok(NetTransport {
            tls: TlsConfig::client().build()?,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Create a transport with a custom TLS configuration
    pub fn with_tls(tls: TlsConfig) -> Self {
        NetTransport {
            tls,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Set the per-I/O timeout
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Get the per-I/O timeout
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Time allowed for the next blocking step
    fn budget(&self, deadline: Option<Instant>) -> Result<Duration> {
        match deadline {
            None => Ok(self.io_timeout),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    Err(Error::DeadlineExceeded)
                } else {
                    Ok(remaining.min(self.io_timeout))
                }
            }
        }
    }

    fn connect_tcp(&self, addrs: &[SocketAddr], deadline: Option<Instant>) -> Result<TcpStream> {
        let mut last_err = None;

        for addr in addrs {
            let timeout = self.budget(deadline)?;
            let domain = match addr {
                SocketAddr::V4(_) => Domain::IPV4,
                SocketAddr::V6(_) => Domain::IPV6,
            };

            let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
            match socket.connect_timeout(&SockAddr::from(*addr), timeout) {
                Ok(()) => {
                    socket.set_nodelay(true)?;
                    return Ok(socket.into());
                }
                Err(e) => {
                    tracing::trace!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut && deadline.is_some_and(|d| Instant::now() >= d) => {
                Error::DeadlineExceeded
            }
            Some(e) => Error::Io(e),
            None => Error::InvalidUrl("host resolved to no addresses".to_string()),
        })
    }

    fn open(&self, request: &HttpRequest, deadline: Option<Instant>) -> Result<Connection> {
        let url = request.url();
        let addrs = url.socket_addrs(|| None)?;
        let stream = self.connect_tcp(&addrs, deadline)?;

        if url.scheme() != "https" {
            return Ok(Connection::Plain(FdSessionOps::new(stream)));
        }

        // The handshake is blocking; bound it with socket timeouts
        let timeout = self.budget(deadline)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let servername = url
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']');
        let tls = self.tls.connect(stream, servername)?;
        Ok(Connection::Tls(Box::new(tls)))
    }
}

impl Transport for NetTransport {
    fn execute(&mut self, request: &HttpRequest, deadline: Option<Instant>) -> Result<RawResponse> {
        let mut client = HttpClient::new(self.open(request, deadline)?);
        client.set_timeout(self.io_timeout);
        client.set_deadline(deadline);

        let result = client.exchange(request);
        if let Err(e) = client.close() {
            tracing::trace!(error = %e, "close failed");
        }
        let response = result?;

        tracing::debug!(
            method = %request.method(),
            host = request.url().host_str().unwrap_or_default(),
            path = request.url().path(),
            status = response.status().code(),
            "exchange complete"
        );

        Ok(response.into_raw(request.capture_headers()))
    }
}

#[cfg(test)]
pub(crate) use scripted::ScriptedTransport;
