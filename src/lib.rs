//! Publisher portal client
//!
//! This crate logs into a vendor publisher web portal through its browser
//! login flow and hands out an authenticated session for report requests.
//!
//! - [`http`] is a small blocking HTTP/1.1 transport that never follows
//!   redirects and exposes raw response headers.
//! - [`portal`] drives the multi-phase login (including the two-factor
//!   interruption) and wraps the resulting session.

pub mod http;
pub mod portal;

pub use portal::{
    Credentials, Error, LoginOutcome, PortalClient, PortalConfig, Session, SessionToken,
    TfaResumeContext,
};
