//! End-to-end login tests over real sockets

mod common;

use common::{js_bounce, login_form, page, redirect, tfa_form, CannedServer};
use publisher_portal::http::NetTransport;
use publisher_portal::portal::Phase;
use publisher_portal::{Error, LoginOutcome, PortalClient, PortalConfig, TfaResumeContext};
use std::fs;
use std::time::Duration;

const FRONTEND: &str = "_genesis_auth_frontend_session";

fn config_for(server: &CannedServer) -> PortalConfig {
    PortalConfig::builder()
        .sales_url(server.url("/sales.html"))
        .logout_url(server.url("/logout"))
        .identity_base_url(server.base_url())
        .login_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn client_for(server: &CannedServer) -> PortalClient<NetTransport> {
    let transport = NetTransport::new()
        .unwrap()
        .with_io_timeout(Duration::from_secs(5));
    PortalClient::with_transport(transport, config_for(server))
}

/// Phases 1 to 4 of the login
fn until_bounce(server: &CannedServer) -> Vec<String> {
    vec![
        redirect(&server.url("/authorize?client_id=portal"), &[]),
        redirect(&server.url("/conversations/abc"), &[]),
        page(
            "200 OK",
            &login_form("tok1"),
            &[format!("{}=front1; path=/; HttpOnly", FRONTEND).as_str()],
        ),
        redirect(
            "/conversations/abc/bounce",
            &[format!("{}=front2; path=/; HttpOnly", FRONTEND).as_str()],
        ),
    ]
}

#[test]
fn test_login_without_tfa() {
    let server = CannedServer::bind();
    let mut client = client_for(&server);

    let mut responses = until_bounce(&server);
    responses.push(page("200 OK", &js_bounce("/auth/callback?code=c1"), &[]));
    responses.push(redirect(
        "/sales.html",
        &["kharma_session=abc%20123; Path=/; HttpOnly"],
    ));
    let handle = server.serve(responses);

    let outcome = client.login("me@example.com", "s3cret").unwrap();
    let token = match outcome {
        LoginOutcome::Authenticated(token) => token,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(token.as_str(), "abc 123");
    assert!(client.is_logged_in());

    let requests = handle.join().unwrap();
    assert_eq!(requests.len(), 6);
    assert!(requests[0].starts_with("GET /sales.html HTTP/1.1\r\n"));
    assert!(requests[1].starts_with("GET /authorize?client_id=portal HTTP/1.1\r\n"));
    assert!(requests[3].starts_with("POST /conversations/abc HTTP/1.1\r\n"));
    assert!(requests[3].contains(&format!("Cookie: {}=front1\r\n", FRONTEND)));
    assert!(requests[3].contains("authenticity_token=tok1"));
    assert!(requests[3].contains("conversations_create_session_form%5Bpassword%5D=s3cret"));
    assert!(requests[4].starts_with("GET /conversations/abc/bounce HTTP/1.1\r\n"));
    assert!(requests[4].contains(&format!("Cookie: {}=front2\r\n", FRONTEND)));
    assert!(requests[5].starts_with("GET /auth/callback?code=c1 HTTP/1.1\r\n"));
    assert!(!requests[5].contains("Cookie:"));
    assert!(requests
        .iter()
        .all(|r| r.contains("User-Agent: Mozilla/5.0")));
}

#[test]
fn test_login_with_tfa_across_clients() {
    let server = CannedServer::bind();
    let mut responses = until_bounce(&server);
    responses.push(page(
        "200 OK",
        &tfa_form("/conversations/abc/tfa", "tok2"),
        &[],
    ));
    responses.push(redirect("/conversations/abc/done", &[]));
    responses.push(page("200 OK", &js_bounce("/auth/callback?code=c2"), &[]));
    responses.push(redirect("/sales.html", &["kharma_session=tfa%2Btoken; Path=/"]));
    let config = config_for(&server);
    let handle = server.serve(responses);

    // First client suspends at the TFA prompt
    let mut first = PortalClient::with_transport(NetTransport::new().unwrap(), config.clone());
    let context = match first.login("me@example.com", "s3cret").unwrap() {
        LoginOutcome::TfaRequired(context) => context,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(!first.is_logged_in());
    drop(first);

    // The context survives a trip through a file
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resume.json");
    fs::write(&path, serde_json::to_string(&context).unwrap()).unwrap();
    let restored: TfaResumeContext =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(restored, context);
    assert!(restored.form_submit_url().ends_with("/conversations/abc/tfa"));

    // A second client finishes the login from the restored context
    let mut second = PortalClient::with_transport(NetTransport::new().unwrap(), config);
    let outcome = second.resume_with_code(restored, "000000").unwrap();
    match outcome {
        LoginOutcome::Authenticated(token) => assert_eq!(token.as_str(), "tfa+token"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(second.is_logged_in());

    let requests = handle.join().unwrap();
    assert_eq!(requests.len(), 8);
    assert!(requests[5].starts_with("POST /conversations/abc/tfa HTTP/1.1\r\n"));
    assert!(requests[5].contains(&format!("Cookie: {}=front2\r\n", FRONTEND)));
    assert!(requests[5].contains("conversations_tfa_required_form%5Bverify_code%5D=000000"));
    assert!(requests[6].starts_with("GET /conversations/abc/done HTTP/1.1\r\n"));
}

#[test]
fn test_missing_token_stops_before_posting() {
    let server = CannedServer::bind();
    let mut client = client_for(&server);
    let responses = vec![
        redirect(&server.url("/authorize"), &[]),
        redirect(&server.url("/conversations/abc"), &[]),
        page(
            "200 OK",
            "<html><form></form></html>",
            &[format!("{}=front1; path=/", FRONTEND).as_str()],
        ),
    ];
    let handle = server.serve(responses);

    let err = client.login("me@example.com", "s3cret").unwrap_err();
    assert!(matches!(
        err,
        Error::Extraction {
            phase: Phase::LoadAuthPage,
            what: "authenticityToken"
        }
    ));
    assert_eq!(handle.join().unwrap().len(), 3);
}

#[test]
fn test_error_status_fails_login() {
    let server = CannedServer::bind();
    let mut client = client_for(&server);
    let handle = server.serve(vec![page("503 Service Unavailable", "down", &[])]);

    let err = client.login("me@example.com", "s3cret").unwrap_err();
    assert!(matches!(
        err,
        Error::HttpStatus {
            code: 503,
            reason: "Service Unavailable"
        }
    ));
    assert!(!client.is_logged_in());
    handle.join().unwrap();
}

#[test]
fn test_unregistered_status_fails_login() {
    let server = CannedServer::bind();
    let mut client = client_for(&server);
    let handle = server.serve(vec![page("999 Weird", "", &[])]);

    let err = client.login("me@example.com", "s3cret").unwrap_err();
    assert!(matches!(
        err,
        Error::HttpStatus {
            code: 999,
            reason: "Unknown"
        }
    ));
    handle.join().unwrap();
}

#[test]
fn test_logout_after_token_login() {
    let server = CannedServer::bind();
    let mut client = client_for(&server);
    let handle = server.serve(vec![redirect("/", &[])]);

    client.login_with_token("a b").unwrap();
    assert_eq!(client.cookie_header().unwrap(), "kharma_session=a+b");
    client.logout().unwrap();
    assert!(!client.is_logged_in());

    let requests = handle.join().unwrap();
    assert!(requests[0].starts_with("GET /logout HTTP/1.1\r\n"));
    assert!(requests[0].contains("Cookie: kharma_session=a+b\r\n"));
}

#[test]
fn test_unreachable_portal_is_transport_error() {
    // Bind and drop to get a port nobody listens on
    let server = CannedServer::bind();
    let mut client = client_for(&server);
    drop(server);

    let err = client.login("me@example.com", "s3cret").unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
