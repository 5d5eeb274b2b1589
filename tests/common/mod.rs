//! Canned HTTP server shared by the integration tests
//!
//! Each queued response is served on its own connection, matching the
//! one-request-per-connection transport.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

pub struct CannedServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CannedServer {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        CannedServer { listener, addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Serve `responses` in order; the handle yields the raw requests
    pub fn serve(self, responses: Vec<String>) -> JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = self.listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                stream.write_all(response.as_bytes()).unwrap();
            }
            requests
        })
    }
}

/// Read one request head and its `Content-Length` body
pub fn read_request<S: Read>(stream: &mut S) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(": "))
                .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&data).into_owned()
}

pub fn redirect(location: &str, cookies: &[&str]) -> String {
    let mut response = format!("HTTP/1.1 302 Found\r\nLocation: {}\r\n", location);
    for cookie in cookies {
        response.push_str(&format!("Set-Cookie: {}\r\n", cookie));
    }
    response.push_str("Content-Length: 0\r\n\r\n");
    response
}

pub fn page(status: &str, body: &str, cookies: &[&str]) -> String {
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\n",
        status
    );
    for cookie in cookies {
        response.push_str(&format!("Set-Cookie: {}\r\n", cookie));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    response
}

pub fn login_form(token: &str) -> String {
    format!(
        r#"<html><body>
<form id="new_conversations_create_session_form" method="post">
  <input type="hidden" name="_method" value="put" />
  <input type="hidden" name="authenticity_token" value="{}" />
  <input type="email" name="conversations_create_session_form[email]" />
  <input type="password" name="conversations_create_session_form[password]" />
</form>
</body></html>"#,
        token
    )
}

pub fn tfa_form(action: &str, token: &str) -> String {
    format!(
        r#"<html><body>
<form id="new_conversations_tfa_required_form" action="{}" method="post">
  <input type="hidden" name="authenticity_token" value="{}" />
  <input type="text" name="conversations_tfa_required_form[verify_code]" />
</form>
</body></html>"#,
        action, token
    )
}

pub fn js_bounce(target: &str) -> String {
    format!(
        r#"<html><head><script>window.location.href = "{}";</script></head></html>"#,
        target
    )
}
