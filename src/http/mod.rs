//! HTTP/1.1 transport for the portal client
//!
//! This module provides just enough HTTP to walk a browser login flow by hand:
//! one request per connection, no automatic redirects, and access to the raw
//! header block so cookies and `Location` values can be inspected.
//!
//! # Architecture
//!
//! The I/O layer uses a session operations abstraction so that plain TCP and
//! TLS connections share the same request/response code:
//!
//! - `SessionOps` defines poll, read, write and close
//! - `HttpSession` wraps a `SessionOps` and enforces timeouts and deadlines
//! - `HttpClient` writes a request and reads one framed response
//! - `Transport` is the seam the login state machine talks to
//!
//! # Examples
//!
//! ```no_run
//! use publisher_portal::http::{HttpRequest, NetTransport, Transport};
//!
//! let mut transport = NetTransport::new().unwrap();
//! let request = HttpRequest::builder()
//!     .get("https://example.com/sales.html")
//!     .capture_headers(true)
//!     .build()
//!     .unwrap();
//!
//! let response = transport.execute(&request, None).unwrap();
//! assert!(response.headers_included);
//! ```

pub mod chunked;
pub mod client;
pub mod cookie;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;
pub mod transport;

pub use client::HttpClient;
pub use cookie::SetCookie;
pub use headers::Headers;
pub use message::{HttpRequest, HttpResponse, Method, RawResponse, Status, Version};
pub use parser::{split_headers_and_body, ResponseParser};
pub use session::{HttpSession, SessionOps};
pub use transport::{NetTransport, Transport};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Incomplete message")]
    Incomplete,

    #[error("Timeout")]
    Timeout,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Separator between the header block and the body
pub const HEADER_END: &str = "\r\n\r\n";
