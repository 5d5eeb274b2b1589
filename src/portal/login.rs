//! Login state machine
//!
//! The portal login is a chain of single HTTP exchanges:
//!
//! | Phase  | Request                           | Expected response                    |
//! |--------|-----------------------------------|--------------------------------------|
//! | Phase1 | GET sales page                    | redirect to the authorize endpoint   |
//! | Phase2 | GET authorize URL                 | redirect to the identity provider    |
//! | Phase3 | GET identity page                 | 200, frontend cookie, hidden token   |
//! | Phase4 | POST credentials                  | redirect to the bounce page          |
//! | Phase5 | GET bounce page                   | 200, TFA form or JavaScript redirect |
//! | Phase7 | POST TFA code (after resume)      | redirect to the bounce page          |
//! | Phase8 | GET JavaScript redirect target    | redirect carrying the session cookie |
//!
//! Each [`LoginState`] carries exactly what its pending phase needs, so the
//! only thing that survives a TFA suspension is the [`TfaResumeContext`]
//! handed to the caller. Nothing is retried: the first failure moves the
//! flow to [`LoginState::Failed`].

use super::config::PortalConfig;
use super::extract;
use super::{Error, Result};
use crate::http::cookie::{cookie_header, find_cookie};
use crate::http::message::HttpRequestBuilder;
use crate::http::{self, split_headers_and_body, Headers, HttpRequest, Transport};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use url::Url;

/// One HTTP exchange of the login sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ResolveAuthorize,
    ResolveIdRedirect,
    LoadAuthPage,
    SubmitCredentials,
    Bounce,
    SubmitTfaCode,
    FollowBounce,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ResolveAuthorize => "Phase1",
            Phase::ResolveIdRedirect => "Phase2",
            Phase::LoadAuthPage => "Phase3",
            Phase::SubmitCredentials => "Phase4",
            Phase::Bounce => "Phase5",
            Phase::SubmitTfaCode => "Phase7",
            Phase::FollowBounce => "Phase8",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portal account credentials
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decoded value of the portal session cookie
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        SessionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Everything needed to finish a login after the TFA prompt
///
/// The context is plain data: it can be serialized, stored, and handed back
/// to [`LoginFlow::resume`] from a different process. It is meant to be
/// consumed once.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TfaResumeContext {
    form_submit_url: String,
    transient_cookies: BTreeMap<String, String>,
    authenticity_token: String,
}

impl TfaResumeContext {
    pub fn new(
        form_submit_url: impl Into<String>,
        transient_cookies: BTreeMap<String, String>,
        authenticity_token: impl Into<String>,
    ) -> Self {
        TfaResumeContext {
            form_submit_url: form_submit_url.into(),
            transient_cookies,
            authenticity_token: authenticity_token.into(),
        }
    }

    /// Absolute URL the TFA code is posted to
    pub fn form_submit_url(&self) -> &str {
        &self.form_submit_url
    }

    pub fn transient_cookies(&self) -> &BTreeMap<String, String> {
        &self.transient_cookies
    }

    pub fn authenticity_token(&self) -> &str {
        &self.authenticity_token
    }

    /// True when any part needed for the resume is missing
    pub fn is_empty(&self) -> bool {
        self.form_submit_url.is_empty()
            || self.transient_cookies.is_empty()
            || self.authenticity_token.is_empty()
    }

    fn cookie_header(&self) -> String {
        cookie_header(&self.transient_cookies)
    }
}

impl fmt::Debug for TfaResumeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TfaResumeContext")
            .field("form_submit_url", &self.form_submit_url)
            .field(
                "transient_cookies",
                &self.transient_cookies.keys().collect::<Vec<_>>(),
            )
            .field("authenticity_token", &"<redacted>")
            .finish()
    }
}

/// Result of a login attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(SessionToken),
    /// The identity provider wants a code; pass the context to resume
    TfaRequired(TfaResumeContext),
}

/// Where a login attempt currently stands
pub enum LoginState {
    NotStarted,
    ResolveAuthorize,
    ResolveIdRedirect {
        authorize_url: Url,
    },
    LoadAuthPage {
        identity_url: Url,
    },
    SubmitCredentials {
        identity_url: Url,
        cookies: BTreeMap<String, String>,
        authenticity_token: String,
    },
    Bounce {
        bounce_url: Url,
        cookies: BTreeMap<String, String>,
    },
    TfaRequired(TfaResumeContext),
    SubmitTfaCode {
        context: TfaResumeContext,
        code: String,
    },
    FollowBounce {
        page_url: Url,
        body: String,
    },
    Complete(SessionToken),
    Failed(Error),
}

impl LoginState {
    /// The phase this state will run next, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            LoginState::ResolveAuthorize => Some(Phase::ResolveAuthorize),
            LoginState::ResolveIdRedirect { .. } => Some(Phase::ResolveIdRedirect),
            LoginState::LoadAuthPage { .. } => Some(Phase::LoadAuthPage),
            LoginState::SubmitCredentials { .. } => Some(Phase::SubmitCredentials),
            LoginState::Bounce { .. } => Some(Phase::Bounce),
            LoginState::SubmitTfaCode { .. } => Some(Phase::SubmitTfaCode),
            LoginState::FollowBounce { .. } => Some(Phase::FollowBounce),
            LoginState::NotStarted
            | LoginState::TfaRequired(_)
            | LoginState::Complete(_)
            | LoginState::Failed(_) => None,
        }
    }

    /// Complete, failed, or waiting for a TFA code
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            LoginState::TfaRequired(_) | LoginState::Complete(_) | LoginState::Failed(_)
        )
    }
}

impl fmt::Debug for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::NotStarted => f.write_str("NotStarted"),
            LoginState::ResolveAuthorize => f.write_str("ResolveAuthorize"),
            LoginState::ResolveIdRedirect { authorize_url } => f
                .debug_struct("ResolveIdRedirect")
                .field("authorize_url", &authorize_url.as_str())
                .finish(),
            LoginState::LoadAuthPage { identity_url } => f
                .debug_struct("LoadAuthPage")
                .field("identity_url", &identity_url.as_str())
                .finish(),
            LoginState::SubmitCredentials { identity_url, .. } => f
                .debug_struct("SubmitCredentials")
                .field("identity_url", &identity_url.as_str())
                .finish_non_exhaustive(),
            LoginState::Bounce { bounce_url, .. } => f
                .debug_struct("Bounce")
                .field("bounce_url", &bounce_url.as_str())
                .finish_non_exhaustive(),
            LoginState::TfaRequired(context) => f.debug_tuple("TfaRequired").field(context).finish(),
            LoginState::SubmitTfaCode { context, .. } => f
                .debug_struct("SubmitTfaCode")
                .field("context", context)
                .finish_non_exhaustive(),
            LoginState::FollowBounce { page_url, .. } => f
                .debug_struct("FollowBounce")
                .field("page_url", &page_url.as_str())
                .finish_non_exhaustive(),
            LoginState::Complete(token) => f.debug_tuple("Complete").field(token).finish(),
            LoginState::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// One response, with the URL it was fetched from
struct Page {
    url: Url,
    status: u16,
    headers: Headers,
    body: String,
}

impl Page {
    fn expect_redirect(&self) -> Result<()> {
        if (300..400).contains(&self.status) {
            Ok(())
        } else {
            Err(Error::http_status(self.status))
        }
    }

    fn expect_success(&self) -> Result<()> {
        if (200..300).contains(&self.status) {
            Ok(())
        } else {
            Err(Error::http_status(self.status))
        }
    }

    /// `Location` resolved against the request URL
    fn location(&self, phase: Phase) -> Result<Url> {
        let location = self
            .headers
            .find("Location", None)
            .filter(|l| !l.is_empty())
            .ok_or(Error::Extraction {
                phase,
                what: "location",
            })?;
        resolve(&self.url, location)
    }
}

/// Form-urlencoded decoding of a cookie value (`+` is a space)
fn decode_cookie_value(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn resolve(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference)
        .map_err(|e| http::Error::InvalidUrl(format!("{}: {}", reference, e)).into())
}

/// Drives one login attempt
pub struct LoginFlow<'a, T: Transport> {
    transport: T,
    config: &'a PortalConfig,
    credentials: Option<Credentials>,
    state: LoginState,
    deadline: Option<Instant>,
}

impl<'a, T: Transport> LoginFlow<'a, T> {
    /// Prepare a fresh login; nothing is sent until the first [`step`](Self::step)
    pub fn new(transport: T, config: &'a PortalConfig, credentials: Credentials) -> Self {
        LoginFlow {
            transport,
            config,
            credentials: Some(credentials),
            state: LoginState::NotStarted,
            deadline: None,
        }
    }

    /// Continue a suspended login by submitting `code`
    pub fn resume(
        transport: T,
        config: &'a PortalConfig,
        context: TfaResumeContext,
        code: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let state = if context.is_empty() {
            LoginState::Failed(Error::InvalidState("resume context is empty".to_string()))
        } else if code.trim().is_empty() {
            LoginState::Failed(Error::InvalidState("TFA code is empty".to_string()))
        } else {
            LoginState::SubmitTfaCode { context, code }
        };

        LoginFlow {
            transport,
            config,
            credentials: None,
            state,
            deadline: Some(Instant::now() + config.login_timeout()),
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Run one phase
    ///
    /// Settled states are left unchanged. `NotStarted` sends nothing and
    /// only arms the login deadline.
    pub fn step(&mut self) -> &LoginState {
        let state = std::mem::replace(&mut self.state, LoginState::NotStarted);

        self.state = match state {
            LoginState::NotStarted => {
                tracing::info!(sales_url = %self.config.sales_url(), "login started");
                self.deadline = Some(Instant::now() + self.config.login_timeout());
                LoginState::ResolveAuthorize
            }
            settled if settled.is_settled() => settled,
            pending => {
                let phase = pending.phase();
                match self.advance(pending) {
                    Ok(next) => next,
                    Err(err) => {
                        tracing::warn!(phase = ?phase, error = %err, "login failed");
                        LoginState::Failed(err)
                    }
                }
            }
        };

        &self.state
    }

    /// Step until the flow settles
    pub fn run(mut self) -> Result<LoginOutcome> {
        while !self.state.is_settled() {
            self.step();
        }

        match self.state {
            LoginState::Complete(token) => Ok(LoginOutcome::Authenticated(token)),
            LoginState::TfaRequired(context) => Ok(LoginOutcome::TfaRequired(context)),
            LoginState::Failed(err) => Err(err),
            other => Err(Error::InvalidState(format!("login stopped in {:?}", other))),
        }
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(http::Error::DeadlineExceeded.into()),
            _ => Ok(()),
        }
    }

    fn advance(&mut self, state: LoginState) -> Result<LoginState> {
        self.check_deadline()?;
        let config = self.config;

        match state {
            LoginState::ResolveAuthorize => {
                let page = self.send(HttpRequest::builder(), config.sales_url())?;
                page.expect_redirect()?;
                let authorize_url = page.location(Phase::ResolveAuthorize)?;
                Ok(LoginState::ResolveIdRedirect { authorize_url })
            }

            LoginState::ResolveIdRedirect { authorize_url } => {
                let page = self.send(HttpRequest::builder(), &authorize_url)?;
                page.expect_redirect()?;
                let identity_url = page.location(Phase::ResolveIdRedirect)?;
                Ok(LoginState::LoadAuthPage { identity_url })
            }

            LoginState::LoadAuthPage { identity_url } => {
                let page = self.send(HttpRequest::builder(), &identity_url)?;
                page.expect_success()?;

                let frontend = find_cookie(&page.headers, config.frontend_cookie()).ok_or(
                    Error::Extraction {
                        phase: Phase::LoadAuthPage,
                        what: "frontendSessionCookie",
                    },
                )?;
                let authenticity_token =
                    extract::hidden_input_value(&page.body, &config.fields().authenticity_token)
                        .ok_or(Error::Extraction {
                            phase: Phase::LoadAuthPage,
                            what: "authenticityToken",
                        })?;

                let mut cookies = BTreeMap::new();
                cookies.insert(config.frontend_cookie().to_string(), frontend);
                Ok(LoginState::SubmitCredentials {
                    identity_url,
                    cookies,
                    authenticity_token,
                })
            }

            LoginState::SubmitCredentials {
                identity_url,
                mut cookies,
                authenticity_token,
            } => {
                let credentials = self.credentials.take().ok_or_else(|| {
                    Error::InvalidState("no credentials for this login".to_string())
                })?;
                let fields = config.fields();
                let form = [
                    (fields.method_override.as_str(), "put"),
                    (fields.authenticity_token.as_str(), authenticity_token.as_str()),
                    (fields.email.as_str(), credentials.email.as_str()),
                    (fields.password.as_str(), credentials.password.as_str()),
                    (fields.remember_me.as_str(), "true"),
                ];

                let builder = HttpRequest::builder()
                    .post(identity_url.as_str())
                    .cookie(cookie_header(&cookies))
                    .form(form);
                let page = self.send(builder, &identity_url)?;
                page.expect_redirect()?;

                self.refresh_cookies(&page, &mut cookies);
                let bounce_url = page.location(Phase::SubmitCredentials)?;
                Ok(LoginState::Bounce {
                    bounce_url,
                    cookies,
                })
            }

            LoginState::Bounce {
                bounce_url,
                mut cookies,
            } => {
                let builder = HttpRequest::builder().cookie(cookie_header(&cookies));
                let page = self.send(builder, &bounce_url)?;
                page.expect_success()?;

                if !page.body.contains(config.tfa_marker()) {
                    return Ok(LoginState::FollowBounce {
                        page_url: page.url,
                        body: page.body,
                    });
                }

                self.refresh_cookies(&page, &mut cookies);
                let action = extract::form_action(&page.body, config.tfa_form_id()).ok_or(
                    Error::Extraction {
                        phase: Phase::Bounce,
                        what: "tfaFormAction",
                    },
                )?;
                let authenticity_token =
                    extract::hidden_input_value(&page.body, &config.fields().authenticity_token)
                        .ok_or(Error::Extraction {
                            phase: Phase::Bounce,
                            what: "authenticityToken",
                        })?;
                let form_submit_url = resolve(config.identity_base_url(), &action)?;

                tracing::info!(form = %form_submit_url, "two-factor code required");
                Ok(LoginState::TfaRequired(TfaResumeContext::new(
                    form_submit_url.as_str(),
                    cookies,
                    authenticity_token,
                )))
            }

            LoginState::SubmitTfaCode { context, code } => {
                let form_url = Url::parse(context.form_submit_url()).map_err(|e| {
                    http::Error::InvalidUrl(format!("{}: {}", context.form_submit_url(), e))
                })?;
                let fields = config.fields();
                let form = [
                    (fields.method_override.as_str(), "put"),
                    (fields.authenticity_token.as_str(), context.authenticity_token()),
                    (fields.tfa_code.as_str(), code.as_str()),
                ];

                let builder = HttpRequest::builder()
                    .post(form_url.as_str())
                    .cookie(context.cookie_header())
                    .form(form);
                let page = self.send(builder, &form_url)?;
                page.expect_redirect()?;

                let mut cookies = context.transient_cookies;
                self.refresh_cookies(&page, &mut cookies);
                let bounce_url = page.location(Phase::SubmitTfaCode)?;
                Ok(LoginState::Bounce {
                    bounce_url,
                    cookies,
                })
            }

            LoginState::FollowBounce { page_url, body } => {
                let target = extract::js_redirect(&body).ok_or(Error::Extraction {
                    phase: Phase::FollowBounce,
                    what: "jsRedirect",
                })?;
                let target = resolve(&page_url, &target)?;

                // No cookies: the portal sets its own session here
                let page = self.send(HttpRequest::builder(), &target)?;
                page.expect_redirect()?;

                let raw = find_cookie(&page.headers, config.session_cookie()).ok_or(
                    Error::Extraction {
                        phase: Phase::FollowBounce,
                        what: "sessionCookie",
                    },
                )?;
                let token = decode_cookie_value(&raw);

                tracing::info!("login complete");
                Ok(LoginState::Complete(SessionToken(token)))
            }

            other => Err(Error::InvalidState(format!(
                "no phase to run in {:?}",
                other
            ))),
        }
    }

    /// Pick up a re-issued frontend cookie
    fn refresh_cookies(&self, page: &Page, cookies: &mut BTreeMap<String, String>) {
        let name = self.config.frontend_cookie();
        if let Some(value) = find_cookie(&page.headers, name) {
            cookies.insert(name.to_string(), value);
        }
    }

    /// Execute one exchange, capturing headers
    ///
    /// `builder` carries method, body and cookies; a GET to `url` is used
    /// when no method was set.
    fn send(&mut self, builder: HttpRequestBuilder, url: &Url) -> Result<Page> {
        let request = builder
            .url(url.as_str())
            .header("User-Agent", self.config.user_agent())
            .header("Referer", url.as_str())
            .capture_headers(true)
            .build()?;

        let raw = self.transport.execute(&request, self.deadline)?;
        tracing::debug!(
            method = %request.method(),
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            status = raw.status,
            "login exchange"
        );

        let (headers, body) = if raw.headers_included {
            split_headers_and_body(&raw.body)
        } else {
            (Headers::new(), raw.body)
        };

        Ok(Page {
            url: url.clone(),
            status: raw.status,
            headers,
            body,
        })
    }
}
