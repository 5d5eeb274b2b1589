//! Authenticated portal client
//!
//! `PortalClient` owns one session at a time. Logging in twice without a
//! logout or reset is refused, and a TFA resume context is accepted only
//! once per client. The client remembers the last
//! [`MAX_CONSUMED_CONTEXTS`] contexts it resumed; older ones are forgotten.

use super::config::PortalConfig;
use super::login::{Credentials, LoginFlow, LoginOutcome, SessionToken, TfaResumeContext};
use super::{Error, Result};
use crate::http::message::HttpRequestBuilder;
use crate::http::{cookie, HttpRequest, NetTransport, RawResponse, Transport};
use std::collections::VecDeque;
use url::form_urlencoded;

/// How many resumed contexts a client remembers for replay checks
pub const MAX_CONSUMED_CONTEXTS: usize = 32;

/// The client's login status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<SessionToken>,
}

impl Session {
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Publisher portal client
pub struct PortalClient<T: Transport = NetTransport> {
    transport: T,
    config: PortalConfig,
    session: Session,
    /// Authenticity tokens of resumed contexts, oldest first
    consumed_contexts: VecDeque<String>,
}

impl PortalClient<NetTransport> {
    /// Create a client that talks to the network
    pub fn new(config: PortalConfig) -> Result<Self> {
        Ok(Self::with_transport(NetTransport::new()?, config))
    }
}

impl<T: Transport> PortalClient<T> {
    pub fn with_transport(transport: T, config: PortalConfig) -> Self {
        PortalClient {
            transport,
            config,
            session: Session::default(),
            consumed_contexts: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Log in with email and password
    ///
    /// Returns [`LoginOutcome::TfaRequired`] when the account asks for a
    /// two-factor code; finish with [`resume_with_code`](Self::resume_with_code).
    pub fn login(&mut self, email: &str, password: &str) -> Result<LoginOutcome> {
        self.assert_not_logged_in()?;

        let credentials = Credentials::new(email, password);
        let outcome = LoginFlow::new(&mut self.transport, &self.config, credentials).run()?;
        self.adopt(&outcome);
        Ok(outcome)
    }

    /// Finish a login that stopped at the TFA prompt
    ///
    /// The context counts as used once the code has been accepted for
    /// sending, even if the exchange then fails. A blank code is refused
    /// without using up the context.
    pub fn resume_with_code(
        &mut self,
        context: TfaResumeContext,
        code: &str,
    ) -> Result<LoginOutcome> {
        self.assert_not_logged_in()?;
        if context.is_empty() {
            return Err(Error::InvalidState("resume context is empty".to_string()));
        }
        if code.trim().is_empty() {
            return Err(Error::InvalidState("TFA code is empty".to_string()));
        }
        self.consume(context.authenticity_token())?;

        let outcome = LoginFlow::resume(&mut self.transport, &self.config, context, code).run()?;
        self.adopt(&outcome);
        Ok(outcome)
    }

    /// Use a session token obtained earlier
    pub fn login_with_token(&mut self, token: impl Into<String>) -> Result<()> {
        self.assert_not_logged_in()?;

        let token = token.into();
        if token.is_empty() {
            return Err(Error::InvalidState("session token is empty".to_string()));
        }
        self.session.token = Some(SessionToken::new(token));
        Ok(())
    }

    /// End the portal session
    pub fn logout(&mut self) -> Result<()> {
        let url = self.config.logout_url().as_str().to_string();
        self.get(&url)?;

        self.session.token = None;
        tracing::info!("logged out");
        Ok(())
    }

    /// Forget the session without contacting the portal
    pub fn reset(&mut self) {
        self.session.token = None;
    }

    /// `Cookie` header value carrying the session token
    pub fn cookie_header(&self) -> Result<String> {
        let token = self.require_token()?;
        let encoded: String = form_urlencoded::byte_serialize(token.as_str().as_bytes()).collect();
        Ok(cookie::cookie_header([(self.config.session_cookie(), encoded)]))
    }

    /// Authenticated GET
    pub fn get(&mut self, url: &str) -> Result<RawResponse> {
        let request = HttpRequest::builder().get(url);
        self.execute(request, url)
    }

    /// Authenticated form POST
    pub fn post_form<K, V>(
        &mut self,
        url: &str,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<RawResponse>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let request = HttpRequest::builder().post(url).form(fields);
        self.execute(request, url)
    }

    fn execute(&mut self, builder: HttpRequestBuilder, url: &str) -> Result<RawResponse> {
        let request = builder
            .header("User-Agent", self.config.user_agent())
            .header("Referer", url)
            .cookie(self.cookie_header()?)
            .build()?;

        let response = self.transport.execute(&request, None)?;
        if response.status >= 400 {
            return Err(Error::http_status(response.status));
        }
        Ok(response)
    }

    fn consume(&mut self, authenticity_token: &str) -> Result<()> {
        if self
            .consumed_contexts
            .iter()
            .any(|used| used == authenticity_token)
        {
            return Err(Error::InvalidState(
                "resume context was already used".to_string(),
            ));
        }
        if self.consumed_contexts.len() == MAX_CONSUMED_CONTEXTS {
            self.consumed_contexts.pop_front();
        }
        self.consumed_contexts.push_back(authenticity_token.to_string());
        Ok(())
    }

    fn adopt(&mut self, outcome: &LoginOutcome) {
        if let LoginOutcome::Authenticated(token) = outcome {
            self.session.token = Some(token.clone());
        }
    }

    fn require_token(&self) -> Result<&SessionToken> {
        self.session.token().ok_or_else(|| {
            Error::InvalidState("can't execute operation when not logged in".to_string())
        })
    }

    fn assert_not_logged_in(&self) -> Result<()> {
        if self.is_logged_in() {
            return Err(Error::InvalidState("login already performed".to_string()));
        }
        Ok(())
    }
}
