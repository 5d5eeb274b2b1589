//! HTTP response parsing
//!
//! Two entry points:
//!
//! - [`ResponseParser`] frames a response as it arrives on a socket
//!   (`Content-Length`, chunked, or read until close).
//! - [`split_headers_and_body`] splits an already captured raw response, the
//!   form the login state machine works with.

use super::chunked::{find_crlf, ChunkedDecoder};
use super::{Error, Headers, HttpResponse, Result, Status, Version, HEADER_END};
use bytes::{Buf, BytesMut};

/// Split a raw response into its header list and body
///
/// The header block ends at the first `\r\n\r\n`. The status line is
/// discarded and every following line is split once on `": "`; duplicate
/// names and their order are preserved. Without a blank line the whole input
/// is treated as headers and the body is empty.
pub fn split_headers_and_body(raw: &str) -> (Headers, String) {
    let (head, body) = match raw.find(HEADER_END) {
        Some(pos) => (&raw[..pos], &raw[pos + HEADER_END.len()..]),
        None => (raw, ""),
    };

    let headers = head
        .split("\r\n")
        .skip(1)
        .filter_map(|line| {
            let parsed = line.split_once(": ");
            if parsed.is_none() && !line.is_empty() {
                tracing::trace!(line, "skipping malformed header line");
            }
            parsed.map(|(name, value)| (name.to_string(), value.to_string()))
        })
        .collect();

    (headers, body.to_string())
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS REASON\r\n
/// Example: HTTP/1.1 302 Found\r\n
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version = Version::parse(parts[0])?;
    let status_code = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::Parse(format!("Invalid status code: {}", parts[1])))?;
    let status = Status::new(status_code)?;
    let reason = match parts.get(2) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => status.reason_phrase().to_string(),
    };

    Ok((version, status, reason))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    StatusLine,
    Headers,
    Body,
    Complete,
}

#[derive(Debug)]
enum Framing {
    Empty,
    Length(usize),
    Chunked(ChunkedDecoder),
    UntilClose,
}

/// Incremental HTTP response parser
pub struct ResponseParser {
    state: ParserState,
    buffer: BytesMut,
    version: Option<Version>,
    status: Option<Status>,
    reason: Option<String>,
    headers: Headers,
    framing: Framing,
    body: Vec<u8>,
}

impl ResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        ResponseParser {
            state: ParserState::StatusLine,
            buffer: BytesMut::with_capacity(8192),
            version: None,
            status: None,
            reason: None,
            headers: Headers::new(),
            framing: Framing::Empty,
            body: Vec::new(),
        }
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(response)) when a complete response is parsed,
    /// Ok(None) if more data is needed, or Err on parse error.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<HttpResponse>> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                ParserState::StatusLine => {
                    let Some(crlf_pos) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    let line = String::from_utf8_lossy(&self.buffer[..crlf_pos]).to_string();
                    self.buffer.advance(crlf_pos + 2);

                    let (version, status, reason) = parse_status_line(&line)?;
                    self.version = Some(version);
                    self.status = Some(status);
                    self.reason = Some(reason);
                    self.state = ParserState::Headers;
                }

                ParserState::Headers => {
                    let Some(crlf_pos) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    if crlf_pos == 0 {
                        // Empty line marks end of headers
                        self.buffer.advance(2);
                        if self.status.is_some_and(|s| s.is_informational()) {
                            // Interim response, the real one follows
                            self.headers.clear();
                            self.state = ParserState::StatusLine;
                            continue;
                        }
                        self.framing = self.select_framing()?;
                        self.state = ParserState::Body;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&self.buffer[..crlf_pos]).to_string();
                    self.buffer.advance(crlf_pos + 2);

                    let (name, value) = Headers::parse_header_line(&line)?;
                    self.headers.insert(name, value);
                }

                ParserState::Body => {
                    let done = match &mut self.framing {
                        Framing::Empty => true,
                        Framing::Length(remaining) => {
                            let take = (*remaining).min(self.buffer.len());
                            self.body.extend_from_slice(&self.buffer[..take]);
                            self.buffer.advance(take);
                            *remaining -= take;
                            *remaining == 0
                        }
                        Framing::Chunked(decoder) => {
                            decoder.decode(&mut self.buffer, &mut self.body)?
                        }
                        Framing::UntilClose => {
                            self.body.extend_from_slice(&self.buffer);
                            self.buffer.clear();
                            false
                        }
                    };

                    if !done {
                        return Ok(None);
                    }
                    return self.complete().map(Some);
                }

                ParserState::Complete => return Ok(None),
            }
        }
    }

    /// Signal end of input
    ///
    /// Completes a response framed by connection close; any other partial
    /// message is an error.
    pub fn finish(&mut self) -> Result<HttpResponse> {
        let until_close = matches!(self.framing, Framing::UntilClose);
        match self.state {
            ParserState::Body if until_close => self.complete(),
            ParserState::StatusLine if self.buffer.is_empty() => Err(Error::ConnectionClosed),
            _ => Err(Error::Incomplete),
        }
    }

    fn select_framing(&self) -> Result<Framing> {
        if self.status.is_some_and(|s| s.has_no_body()) {
            return Ok(Framing::Empty);
        }

        if let Some(encoding) = self.headers.get("Transfer-Encoding") {
            if encoding.to_ascii_lowercase().contains("chunked") {
                return Ok(Framing::Chunked(ChunkedDecoder::new()));
            }
        }

        if let Some(cl_str) = self.headers.get("Content-Length") {
            let length = cl_str
                .parse::<usize>()
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", cl_str)))?;
            return Ok(if length == 0 {
                Framing::Empty
            } else {
                Framing::Length(length)
            });
        }

        Ok(Framing::UntilClose)
    }

    fn complete(&mut self) -> Result<HttpResponse> {
        let (Some(version), Some(status)) = (self.version, self.status) else {
            return Err(Error::Incomplete);
        };
        self.state = ParserState::Complete;

        Ok(HttpResponse::builder()
            .version(version)
            .status(status)
            .reason(self.reason.take().unwrap_or_default())
            .headers(std::mem::take(&mut self.headers))
            .body(std::mem::take(&mut self.body))
            .build())
    }

    /// Reset the parser for reuse
    pub fn reset(&mut self) {
        self.state = ParserState::StatusLine;
        self.buffer.clear();
        self.version = None;
        self.status = None;
        self.reason = None;
        self.headers.clear();
        self.framing = Framing::Empty;
        self.body.clear();
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}
