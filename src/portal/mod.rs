//! Portal login and authenticated session
//!
//! [`LoginFlow`] walks the browser login one HTTP exchange at a time and
//! either yields a session token or suspends with a [`TfaResumeContext`]
//! when the identity provider asks for a two-factor code. [`PortalClient`]
//! owns the resulting [`Session`] and attaches it to report requests.

pub mod client;
pub mod config;
pub mod extract;
pub mod login;

pub use client::{PortalClient, Session};
pub use config::{FormFields, PortalConfig, PortalConfigBuilder};
pub use login::{
    Credentials, LoginFlow, LoginOutcome, LoginState, Phase, SessionToken, TfaResumeContext,
};

use crate::http;

/// Result type for portal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Portal errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network, TLS or framing failure
    #[error("Transport error: {0}")]
    Transport(#[from] http::Error),

    /// Error status, or a status the current phase does not accept
    #[error("HTTP status {code} ({reason})")]
    HttpStatus { code: u16, reason: &'static str },

    /// Something the current phase needs was not in the response
    #[error("{phase}: {what} not found")]
    Extraction { phase: Phase, what: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build an `HttpStatus` error with the canonical reason phrase
    pub fn http_status(code: u16) -> Self {
        Error::HttpStatus {
            code,
            reason: http::message::reason_phrase(code),
        }
    }
}
