// tests/negotiate_integration.rs

//! Request/response flows driven by `execute_with_negotiate` against a
//! scripted server.

mod support;

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use http::{header, Request, Response, StatusCode};
use negotiate_auth::{execute_with_negotiate, NegotiateAuth, NegotiateConfig, MAX_ROUNDTRIPS};
use support::{round_token, ScriptedGss};

type Seen = Arc<Mutex<Vec<Option<String>>>>;

fn auth(gss: &Arc<ScriptedGss>, config: NegotiateConfig) -> NegotiateAuth {
    NegotiateAuth::new(config, gss.clone()).identity(Arc::new(|| "alice".to_owned()))
}

fn request(uri: &str) -> Request<String> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(String::new())
        .unwrap()
}

fn respond(status: StatusCode, challenge: Option<&str>) -> Response<String> {
    let mut builder = Response::builder().status(status);
    if let Some(challenge) = challenge {
        builder = builder.header(header::WWW_AUTHENTICATE, challenge);
    }
    builder.body(String::new()).unwrap()
}

fn record(seen: &Seen, req: &Request<String>) -> Option<String> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap().to_owned());
    seen.lock().unwrap().push(value.clone());
    value
}

/// Accepts the second client token; answers the first with a server token.
fn two_round_server(
    seen: Seen,
) -> impl FnMut(Request<String>) -> std::future::Ready<Result<Response<String>, Infallible>> {
    move |req| {
        let response = match record(&seen, &req) {
            None => respond(StatusCode::UNAUTHORIZED, Some("Negotiate")),
            Some(v) if v == format!("Negotiate {}", round_token(1)) => {
                respond(StatusCode::UNAUTHORIZED, Some("Negotiate c2VydmVy"))
            }
            Some(v) if v == format!("Negotiate {}", round_token(2)) => respond(StatusCode::OK, None),
            Some(_) => respond(StatusCode::FORBIDDEN, None),
        };
        std::future::ready(Ok(response))
    }
}

#[tokio::test]
async fn test_no_auth_needed() {
    support::init_logger();
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        record(&seen, &req);
        async { Ok::<_, Infallible>(respond(StatusCode::OK, None)) }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
    assert_eq!(gss.exchanges(), 0);
}

#[tokio::test]
async fn test_full_handshake_then_pre_authentication() {
    support::init_logger();
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();
    let req = request("http://web.corp.example/reports");

    let res = execute_with_negotiate(&auth, "c1", &req, two_round_server(seen.clone()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            None,
            Some(format!("Negotiate {}", round_token(1))),
            Some(format!("Negotiate {}", round_token(2))),
        ]
    );
    assert_eq!(auth.cache().token_count(), 1);
    assert_eq!(auth.cache().context_count(), 0);

    // Same connection: the completed token goes out with the first request.
    seen.lock().unwrap().clear();
    let res = execute_with_negotiate(&auth, "c1", &req, two_round_server(seen.clone()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(format!("Negotiate {}", round_token(2)))]
    );
    assert_eq!(gss.exchanges(), 2);
}

#[tokio::test]
async fn test_new_connection_negotiates_again() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();
    let req = request("http://web.corp.example/");

    execute_with_negotiate(&auth, "c1", &req, two_round_server(seen.clone()))
        .await
        .unwrap();
    seen.lock().unwrap().clear();
    execute_with_negotiate(&auth, "c2", &req, two_round_server(seen.clone()))
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(seen.lock().unwrap()[0], None);
    assert_eq!(auth.cache().token_count(), 2);
}

#[tokio::test]
async fn test_unanswerable_challenge_is_returned() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        record(&seen, &req);
        async {
            Ok::<_, Infallible>(respond(StatusCode::UNAUTHORIZED, Some("Basic realm=\"corp\"")))
        }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(gss.exchanges(), 0);
}

#[tokio::test]
async fn test_disabled_mechanism_is_ignored() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        record(&seen, &req);
        async { Ok::<_, Infallible>(respond(StatusCode::UNAUTHORIZED, Some("Kerberos"))) }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_kerberos_scheme() {
    let gss = ScriptedGss::new(1);
    let auth = auth(&gss, NegotiateConfig::default().spnego(false).kerberos(true));
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        let response = match record(&seen, &req) {
            Some(_) => respond(StatusCode::OK, None),
            None => respond(StatusCode::UNAUTHORIZED, Some("Kerberos")),
        };
        async move { Ok::<_, Infallible>(response) }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        seen.lock().unwrap()[1],
        Some(format!("Kerberos {}", round_token(1)))
    );
}

#[tokio::test]
async fn test_round_trips_are_bounded() {
    let gss = ScriptedGss::new(u32::MAX);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        record(&seen, &req);
        async {
            Ok::<_, Infallible>(respond(StatusCode::UNAUTHORIZED, Some("Negotiate c2VydmVy")))
        }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(seen.lock().unwrap().len(), 1 + MAX_ROUNDTRIPS);
    assert_eq!(gss.exchanges(), MAX_ROUNDTRIPS);

    // The unfinished context is still cached until close.
    assert_eq!(auth.cache().context_count(), 1);
    auth.close();
    assert_eq!(auth.cache().context_count(), 0);
    assert_eq!(gss.live_handles(), 0);
}

#[tokio::test]
async fn test_rejected_token_ends_negotiation() {
    let gss = ScriptedGss::new(3);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |req| {
        let challenge = match record(&seen, &req) {
            None => "Negotiate",
            // base64("reject")
            Some(_) => "Negotiate cmVqZWN0",
        };
        async move { Ok::<_, Infallible>(respond(StatusCode::UNAUTHORIZED, Some(challenge))) }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(auth.cache().context_count(), 0);
    assert_eq!(gss.live_handles(), 0);
}

#[tokio::test]
async fn test_relative_uri_is_sent_untouched() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());
    let seen: Seen = Arc::default();

    let res = execute_with_negotiate(&auth, "c1", &request("/relative"), |req| {
        record(&seen, &req);
        async { Ok::<_, Infallible>(respond(StatusCode::UNAUTHORIZED, Some("Negotiate"))) }
    })
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());

    let err = execute_with_negotiate(&auth, "c1", &request("http://web.corp.example/"), |_req| async {
        Err::<Response<String>, _>("connection reset")
    })
    .await
    .unwrap_err();

    assert_eq!(err, "connection reset");
}

#[tokio::test]
async fn test_background_sweeper_lifecycle() {
    let gss = ScriptedGss::new(2);
    let auth = auth(&gss, NegotiateConfig::default());

    auth.start().unwrap();
    assert!(auth.cache().is_running());
    auth.start().unwrap();

    auth.close();
    tokio::task::yield_now().await;
    assert!(!auth.cache().is_running());
}
