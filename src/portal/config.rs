//! Portal configuration
//!
//! Defaults target the production publisher portal and its identity
//! provider. Tests point the URLs at a local server.

use super::{Error, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SALES_URL: &str = "https://publisher.assetstore.unity3d.com/sales.html";
pub const DEFAULT_LOGOUT_URL: &str = "https://publisher.assetstore.unity3d.com/logout";
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://id.unity.com";
pub const DEFAULT_FRONTEND_COOKIE: &str = "_genesis_auth_frontend_session";
pub const DEFAULT_SESSION_COOKIE: &str = "kharma_session";
pub const DEFAULT_TFA_MARKER: &str = "conversations_tfa_required_form[verify_code]";
pub const DEFAULT_TFA_FORM_ID: &str = "new_conversations_tfa_required_form";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.3; rv:27.0) Gecko/20100101 Firefox/27.0";
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Form field names posted during login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub authenticity_token: String,
    pub email: String,
    pub password: String,
    pub remember_me: String,
    pub method_override: String,
    pub tfa_code: String,
}

impl Default for FormFields {
    fn default() -> Self {
        FormFields {
            authenticity_token: "authenticity_token".to_string(),
            email: "conversations_create_session_form[email]".to_string(),
            password: "conversations_create_session_form[password]".to_string(),
            remember_me: "conversations_create_session_form[remember_me]".to_string(),
            method_override: "_method".to_string(),
            tfa_code: "conversations_tfa_required_form[verify_code]".to_string(),
        }
    }
}

/// Portal endpoints, cookie names and login limits
#[derive(Debug, Clone)]
pub struct PortalConfig {
    sales_url: Url,
    logout_url: Url,
    identity_base_url: Url,
    frontend_cookie: String,
    session_cookie: String,
    fields: FormFields,
    tfa_marker: String,
    tfa_form_id: String,
    user_agent: String,
    login_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            sales_url: parse_static(DEFAULT_SALES_URL),
            logout_url: parse_static(DEFAULT_LOGOUT_URL),
            identity_base_url: parse_static(DEFAULT_IDENTITY_BASE_URL),
            frontend_cookie: DEFAULT_FRONTEND_COOKIE.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            fields: FormFields::default(),
            tfa_marker: DEFAULT_TFA_MARKER.to_string(),
            tfa_form_id: DEFAULT_TFA_FORM_ID.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }
}

// Only called on the constants above
fn parse_static(s: &str) -> Url {
    Url::parse(s).expect("built-in URL")
}

impl PortalConfig {
    /// Start from the production defaults
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::default()
    }

    pub fn sales_url(&self) -> &Url {
        &self.sales_url
    }

    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    pub fn identity_base_url(&self) -> &Url {
        &self.identity_base_url
    }

    /// Transient cookie set by the identity provider during login
    pub fn frontend_cookie(&self) -> &str {
        &self.frontend_cookie
    }

    /// Cookie carrying the session token on authenticated requests
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    /// Text that only appears on the two-factor form
    pub fn tfa_marker(&self) -> &str {
        &self.tfa_marker
    }

    pub fn tfa_form_id(&self) -> &str {
        &self.tfa_form_id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Budget for one whole login attempt
    pub fn login_timeout(&self) -> Duration {
        self.login_timeout
    }
}

/// Consuming builder for [`PortalConfig`]
///
/// URLs are kept as strings until [`build`](PortalConfigBuilder::build),
/// which rejects anything that is not an absolute `http`/`https` URL.
#[derive(Debug, Clone, Default)]
pub struct PortalConfigBuilder {
    sales_url: Option<String>,
    logout_url: Option<String>,
    identity_base_url: Option<String>,
    frontend_cookie: Option<String>,
    session_cookie: Option<String>,
    fields: Option<FormFields>,
    tfa_marker: Option<String>,
    tfa_form_id: Option<String>,
    user_agent: Option<String>,
    login_timeout: Option<Duration>,
}

impl PortalConfigBuilder {
    pub fn sales_url(mut self, url: impl Into<String>) -> Self {
        self.sales_url = Some(url.into());
        self
    }

    pub fn logout_url(mut self, url: impl Into<String>) -> Self {
        self.logout_url = Some(url.into());
        self
    }

    pub fn identity_base_url(mut self, url: impl Into<String>) -> Self {
        self.identity_base_url = Some(url.into());
        self
    }

    pub fn frontend_cookie(mut self, name: impl Into<String>) -> Self {
        self.frontend_cookie = Some(name.into());
        self
    }

    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = Some(name.into());
        self
    }

    pub fn fields(mut self, fields: FormFields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn tfa_marker(mut self, marker: impl Into<String>) -> Self {
        self.tfa_marker = Some(marker.into());
        self
    }

    pub fn tfa_form_id(mut self, id: impl Into<String>) -> Self {
        self.tfa_form_id = Some(id.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = Some(timeout);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<PortalConfig> {
        let defaults = PortalConfig::default();

        let config = PortalConfig {
            sales_url: validate_url("sales_url", self.sales_url, defaults.sales_url)?,
            logout_url: validate_url("logout_url", self.logout_url, defaults.logout_url)?,
            identity_base_url: validate_url(
                "identity_base_url",
                self.identity_base_url,
                defaults.identity_base_url,
            )?,
            frontend_cookie: self.frontend_cookie.unwrap_or(defaults.frontend_cookie),
            session_cookie: self.session_cookie.unwrap_or(defaults.session_cookie),
            fields: self.fields.unwrap_or(defaults.fields),
            tfa_marker: self.tfa_marker.unwrap_or(defaults.tfa_marker),
            tfa_form_id: self.tfa_form_id.unwrap_or(defaults.tfa_form_id),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            login_timeout: self.login_timeout.unwrap_or(defaults.login_timeout),
        };

        for (name, value) in [
            ("frontend_cookie", &config.frontend_cookie),
            ("session_cookie", &config.session_cookie),
        ] {
            if value.is_empty() || value.contains(['=', ';', ',', ' ']) {
                return Err(Error::InvalidConfig(format!(
                    "{} is not a valid cookie name: {:?}",
                    name, value
                )));
            }
        }
        if config.tfa_marker.is_empty() {
            return Err(Error::InvalidConfig("tfa_marker is empty".to_string()));
        }
        if config.login_timeout.is_zero() {
            return Err(Error::InvalidConfig("login_timeout is zero".to_string()));
        }

        Ok(config)
    }
}

fn validate_url(name: &str, value: Option<String>, default: Url) -> Result<Url> {
    let Some(raw) = value else {
        return Ok(default);
    };

    let url = Url::parse(&raw)
        .map_err(|e| Error::InvalidConfig(format!("{}: {}: {}", name, raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidConfig(format!(
            "{}: {} is not an http(s) URL",
            name, raw
        )));
    }
    Ok(url)
}
