//! HTTP message types
//!
//! This module defines the request, response and status types shared by the
//! client, the parser and the transport.

use super::{Error, Headers, Result, CRLF};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// HTTP methods used by the portal flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Parse version from string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static REASON_PHRASES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (100, "Continue"),
        (101, "Switching Protocols"),
        (200, "OK"),
        (201, "Created"),
        (202, "Accepted"),
        (203, "Non-Authoritative Information"),
        (204, "No Content"),
        (205, "Reset Content"),
        (206, "Partial Content"),
        (300, "Multiple Choices"),
        (301, "Moved Permanently"),
        (302, "Found"),
        (303, "See Other"),
        (304, "Not Modified"),
        (305, "Use Proxy"),
        (306, "(Unused)"),
        (307, "Temporary Redirect"),
        (308, "Permanent Redirect"),
        (400, "Bad Request"),
        (401, "Unauthorized"),
        (402, "Payment Required"),
        (403, "Forbidden"),
        (404, "Not Found"),
        (405, "Method Not Allowed"),
        (406, "Not Acceptable"),
        (407, "Proxy Authentication Required"),
        (408, "Request Timeout"),
        (409, "Conflict"),
        (410, "Gone"),
        (411, "Length Required"),
        (412, "Precondition Failed"),
        (413, "Request Entity Too Large"),
        (414, "Request-URI Too Long"),
        (415, "Unsupported Media Type"),
        (416, "Requested Range Not Satisfiable"),
        (417, "Expectation Failed"),
        (422, "Unprocessable Entity"),
        (426, "Upgrade Required"),
        (429, "Too Many Requests"),
        (500, "Internal Server Error"),
        (501, "Not Implemented"),
        (502, "Bad Gateway"),
        (503, "Service Unavailable"),
        (504, "Gateway Timeout"),
        (505, "HTTP Version Not Supported"),
    ])
});

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    ///
    /// Any three-digit code is accepted; codes without a registered meaning
    /// are classified by their first digit, and 6xx through 9xx count as
    /// errors.
    pub fn new(code: u16) -> Result<Self> {
        if (100..1000).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase, or `"Unknown"`
    pub fn reason_phrase(&self) -> &'static str {
        reason_phrase(self.code)
    }

    /// Check if this is an informational status (1xx)
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Check if this is a redirection status (3xx)
    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Check if this is a client or server error (>= 400)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    /// Responses to these statuses never carry a body
    pub fn has_no_body(&self) -> bool {
        self.is_informational() || self.code == 204 || self.code == 304
    }

    // Common status codes as constants
    pub const OK: Status = Status { code: 200 };
    pub const FOUND: Status = Status { code: 302 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Look up the reason phrase for any numeric code
pub fn reason_phrase(code: u16) -> &'static str {
    REASON_PHRASES.get(&code).copied().unwrap_or("Unknown")
}

/// HTTP request addressed by an absolute URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
    capture_headers: bool,
}

impl HttpRequest {
    /// Create a builder for constructing requests
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the absolute request URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the headers added by the caller
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the response header block should be returned with the body
    pub fn capture_headers(&self) -> bool {
        self.capture_headers
    }

    /// Path and query as sent on the request line
    pub fn request_target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Value for the `Host` header
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Convert the request to wire format
    ///
    /// Every request asks for `Connection: close`; the transport opens one
    /// connection per exchange.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        // Request line
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.request_target().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        push_header(&mut buf, "Host", &self.host_header());
        for (name, value) in self.headers.iter() {
            push_header(&mut buf, name, value);
        }
        if self.method == Method::Post || !self.body.is_empty() {
            push_header(&mut buf, "Content-Length", &self.body.len().to_string());
        }
        push_header(&mut buf, "Connection", "close");

        // Empty line
        buf.extend_from_slice(CRLF.as_bytes());

        buf.extend_from_slice(&self.body);

        buf
    }
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(CRLF.as_bytes());
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    headers: Headers,
    cookie: Option<String>,
    form: Option<Vec<(String, String)>>,
    capture_headers: bool,
}

impl HttpRequestBuilder {
    /// Start a GET request to `url`
    pub fn get(self, url: impl Into<String>) -> Self {
        self.method(Method::Get).url(url)
    }

    /// Start a POST request to `url`
    pub fn post(self, url: impl Into<String>) -> Self {
        self.method(Method::Post).url(url)
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the absolute URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the `Cookie` header (ignored when empty)
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Send url-encoded form fields as the body
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Return the raw response header block in front of the body
    pub fn capture_headers(mut self, capture: bool) -> Self {
        self.capture_headers = capture;
        self
    }

    /// Build the request
    pub fn build(self) -> Result<HttpRequest> {
        let raw_url = self
            .url
            .ok_or_else(|| Error::InvalidUrl("no URL given".to_string()))?;
        let url = Url::parse(&raw_url).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::InvalidUrl(raw_url));
        }

        let mut headers = self.headers;
        if let Some(cookie) = self.cookie.filter(|c| !c.is_empty()) {
            headers.insert("Cookie", cookie);
        }

        let body = match self.form {
            Some(fields) => {
                headers.insert("Content-Type", "application/x-www-form-urlencoded");
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish()
                    .into_bytes()
            }
            None => Vec::new(),
        };

        Ok(HttpRequest {
            method: self.method.unwrap_or(Method::Get),
            url,
            version: Version::default(),
            headers,
            body,
            capture_headers: self.capture_headers,
        })
    }
}

/// HTTP response as read off the wire
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: Version,
    status: Status,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Create a builder for constructing responses
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Render the status line and header block, terminated by the blank line
    pub fn head_to_wire(&self) -> String {
        let mut head = format!(
            "{} {} {}{}",
            self.version,
            self.status.code(),
            self.reason,
            CRLF
        );
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);
        head
    }

    /// Convert the response to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = self.head_to_wire().into_bytes();
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Collapse into the shape handed to the login state machine
    pub fn into_raw(self, include_headers: bool) -> RawResponse {
        let body = String::from_utf8_lossy(&self.body).into_owned();
        let body = if include_headers {
            let mut raw = self.head_to_wire();
            raw.push_str(&body);
            raw
        } else {
            body
        };

        RawResponse {
            status: self.status.code(),
            headers_included: include_headers,
            body,
        }
    }
}

/// Builder for HTTP responses
#[derive(Debug, Default)]
pub struct HttpResponseBuilder {
    version: Option<Version>,
    status: Option<Status>,
    reason: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponseBuilder {
    /// Set the HTTP version
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the status code
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the reason phrase
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Replace all headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Build the response
    pub fn build(self) -> HttpResponse {
        let status = self.status.unwrap_or(Status::OK);
        let reason = self
            .reason
            .unwrap_or_else(|| status.reason_phrase().to_string());
        HttpResponse {
            version: self.version.unwrap_or_default(),
            status,
            reason,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Outcome of one transport exchange
///
/// When `headers_included` is set, `body` starts with the raw status line and
/// header block; split it with [`split_headers_and_body`](super::split_headers_and_body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers_included: bool,
    pub body: String,
}
