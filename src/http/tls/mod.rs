//! TLS support for portal connections
//!
//! The portal is reached over HTTPS, but its certificate handling does not
//! survive strict verification, so the client configuration defaults to
//! verification disabled. SNI is still sent for host names.
//!
//! # Architecture
//!
//! 1. `TlsConfig` holds the built OpenSSL client context
//! 2. `TlsSessionOps` implements `SessionOps` for encrypted I/O
//! 3. The HTTP client code is unchanged and runs over either session type
//!
//! # Examples
//!
//! ```no_run
//! use publisher_portal::http::tls::{TlsConfig, TlsVersion};
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let tls_session = tls_config.connect(tcp_stream, "example.com").unwrap();
//! ```

pub mod config;
pub mod session;

#[cfg(test)]
mod test_cert;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
