//! HTTP client implementation
//!
//! This module sends one request and reads one framed response over a
//! session. Redirects are never followed here; that is the caller's job.

use super::{Error, HttpRequest, HttpResponse, HttpSession, ResponseParser, Result, SessionOps};
use std::time::{Duration, Instant};

/// HTTP client
///
/// Provides methods for sending requests and receiving responses.
pub struct HttpClient<S: SessionOps> {
    session: HttpSession<S>,
    parser: ResponseParser,
}

impl<S: SessionOps> HttpClient<S> {
    /// Create a new HTTP client with a session
    pub fn new(session: S) -> Self {
        HttpClient {
            session: HttpSession::new(session),
            parser: ResponseParser::new(),
        }
    }

    /// Set the timeout for each read and write
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.session.set_timeout(Some(timeout));
    }

    /// Set an absolute deadline for the whole exchange
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.session.set_deadline(deadline);
    }

    /// Send an HTTP request
    pub fn send_request(&mut self, request: &HttpRequest) -> Result<()> {
        let wire = request.to_wire();
        let mut written = 0;

        while written < wire.len() {
            let n = self.session.write(&wire[written..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }

        Ok(())
    }

    /// Receive an HTTP response
    pub fn receive_response(&mut self) -> Result<HttpResponse> {
        self.parser.reset();
        let mut temp = vec![0u8; 4096];

        loop {
            let n = self.session.read(&mut temp)?;

            if n == 0 {
                return self.parser.finish();
            }

            if let Some(response) = self.parser.parse(&temp[..n])? {
                return Ok(response);
            }
        }
    }

    /// Send a request and wait for its response
    pub fn exchange(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        self.send_request(request)?;
        self.receive_response()
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn session(&self) -> &HttpSession<S> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::FdSessionOps;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[test]
    fn test_send_request() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK")
                .unwrap();
            request
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut client = HttpClient::new(FdSessionOps::new(stream));

        let request = HttpRequest::builder()
            .get(format!("http://{}/sales.html", addr))
            .build()
            .unwrap();
        client.send_request(&request).unwrap();

        let request = handle.join().unwrap();
        assert!(request.starts_with("GET /sales.html HTTP/1.1\r\n"));
        assert!(request.contains(&format!("Host: {}\r\n", addr)));
    }

    #[test]
    fn test_receive_redirect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            stream
                .write_all(
                    b"HTTP/1.1 302 Found\r\nLocation: https://id.example.com/\r\n\
                      Set-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n",
                )
                .unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut client = HttpClient::new(FdSessionOps::new(stream));
        let request = HttpRequest::builder()
            .get(format!("http://{}/", addr))
            .build()
            .unwrap();

        let response = client.exchange(&request).unwrap();
        assert_eq!(response.status().code(), 302);
        assert_eq!(response.headers().get("Location"), Some("https://id.example.com/"));
        assert_eq!(response.headers().get_all("Set-Cookie").len(), 2);

        handle.join().unwrap();
    }

    #[test]
    fn test_response_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n<html>").unwrap();
            stream.write_all(b"</html>").unwrap();
            // Dropping the stream closes the connection
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut client = HttpClient::new(FdSessionOps::new(stream));
        let request = HttpRequest::builder()
            .get(format!("http://{}/", addr))
            .build()
            .unwrap();

        let response = client.exchange(&request).unwrap();
        assert_eq!(response.body(), b"<html></html>");

        handle.join().unwrap();
    }

    #[test]
    fn test_connection_closed_before_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut client = HttpClient::new(FdSessionOps::new(stream));
        let request = HttpRequest::builder()
            .get(format!("http://{}/", addr))
            .build()
            .unwrap();

        assert!(matches!(
            client.exchange(&request),
            Err(Error::ConnectionClosed)
        ));
        handle.join().unwrap();
    }
}
