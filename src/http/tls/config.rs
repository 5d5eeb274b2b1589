//! TLS client configuration

use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::net::TcpStream;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS client configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Whether peer certificates are verified
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Perform a client handshake over `stream`
    ///
    /// `servername` is sent as SNI unless it is an IP address literal.
    pub fn connect(
        &self,
        stream: TcpStream,
        servername: &str,
    ) -> Result<super::TlsSessionOps, TlsError> {
        super::session::TlsSessionOps::connect(stream, self, servername)
    }
}

/// Client configuration builder
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    verify_peer: bool,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        ClientConfigBuilder {
            verify_peer: false,
            min_version: None,
            max_version: None,
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Enable/disable peer certificate verification (off by default)
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "minimum version {} is above maximum {}",
                    min.as_str(),
                    max.as_str()
                )));
            }
        }

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx_builder.set_min_proto_version(self.min_version.map(|v| v.to_openssl_version()))?;
        ctx_builder.set_max_proto_version(self.max_version.map(|v| v.to_openssl_version()))?;

        if self.verify_peer {
            ctx_builder.set_default_verify_paths()?;
            ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            ctx_builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            verify_peer: self.verify_peer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_skips_verification() {
        let config = TlsConfig::client().build().unwrap();
        assert!(!config.verify_peer());
    }

    #[test]
    fn test_verify_peer_enabled() {
        let config = TlsConfig::client().verify_peer(true).build().unwrap();
        assert!(config.verify_peer());
    }

    #[test]
    fn test_version_range() {
        assert!(TlsConfig::client()
            .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
            .build()
            .is_ok());
        assert!(matches!(
            TlsConfig::client()
                .version_range(TlsVersion::Tls13, TlsVersion::Tls12)
                .build(),
            Err(TlsError::InvalidConfig(_))
        ));
    }
}
