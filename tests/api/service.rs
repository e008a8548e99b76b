use claim::assert_ok;
use service_probe::configuration::ProbeSettings;
use service_probe::probe::{BodyCheck, ProbeRequest, ProbeState, RequestBuilder};

use crate::helpers::TestApp;

const END_OF_HEADERS: &[&str] = &["", ""];

#[tokio::test]
async fn get_returns_a_200() {
    // Arrange
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::predicate(|response| {
        response.body_text().ends_with("is up")
    }));
    let request = app.browser_request("GET /service/test HTTP/1.1", END_OF_HEADERS);

    // Act
    assert_ok!(client.exchange(request).await);

    // Assert
    assert!(client.is_response_200());
    assert!(client.is_response_body_ok());
    assert_eq!(client.state(), ProbeState::Disconnected);
}

#[tokio::test]
async fn forbidden_path_returns_a_403() -> eyre::Result<()> {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::AcceptAny);
    let request = app.browser_request("GET /service/test/forbidden HTTP/1.1", END_OF_HEADERS);

    client.exchange(request).await?;

    assert!(client.is_response_403());
    assert!(!client.is_response_200());
    client.expect_response_code(403)?;
    Ok(())
}

#[tokio::test]
async fn post_fixture_declares_its_trailing_crlfs_and_returns_a_200() {
    // `Content-Length: 14` covers `norm rocks` plus the CRLF pair that the
    // two trailing empty lines add, so the service sees all 14 bytes.
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::predicate(|response| {
        response.body() == b"norm rocks\r\n\r\n"
    }));
    let request = app.browser_request(
        "POST /service/test HTTP/1.1",
        &[
            "Content-Length: 14",
            "Content-Type: text/plain",
            "",
            "norm rocks",
            "",
            "",
        ],
    );
    assert_eq!(request.body().len(), 14);

    assert_ok!(client.exchange(request).await);

    assert!(client.is_response_200());
    assert!(client.is_response_body_ok());
}

#[tokio::test]
async fn post_declaring_more_bytes_than_it_sends_leaves_the_service_waiting() {
    // Ten body bytes announced as fourteen: the service keeps waiting for the
    // rest, so no response arrives before the probe's timeout.
    let app = TestApp::spawn().await;
    let settings = ProbeSettings {
        io_timeout_milliseconds: 300,
        ..app.probe_settings.clone()
    };
    let mut client = app.probe_with(settings, BodyCheck::AcceptAny);
    let target = app.target();
    let request = RequestBuilder::post("/service/test")
        .host(target.host(), target.port())
        .header("Connection", "close")
        .header("Content-Type", "text/plain")
        .body("norm rocks")
        .declared_content_length(14)
        .build();

    let error = client.exchange(request).await.unwrap_err();

    assert!(error.is_timeout(), "unexpected error: {error:?}");
    assert!(!client.is_response_200());
    assert_eq!(client.state(), ProbeState::Disconnected);
}

#[tokio::test]
async fn post_with_matching_length_is_echoed() {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::predicate(|response| {
        response.body_text() == "norm rocks"
    }));
    let target = app.target();
    let request = RequestBuilder::post("/service/test")
        .host(target.host(), target.port())
        .header("Connection", "close")
        .header("Content-Type", "text/plain")
        .body("norm rocks")
        .build();

    assert_ok!(client.exchange(request).await);

    assert!(client.is_response_200());
    assert!(client.is_response_body_ok());
}

#[tokio::test]
async fn repeated_gets_yield_the_same_status() {
    let app = TestApp::spawn().await;
    let mut statuses = Vec::new();

    for _ in 0..5 {
        let mut client = app.probe(BodyCheck::AcceptAny);
        let request = app.browser_request("GET /service/test HTTP/1.1", END_OF_HEADERS);
        assert_ok!(client.exchange(request).await);
        statuses.push(client.response().map(|response| response.status()));
    }

    assert!(statuses.iter().all(|status| *status == Some(200)), "{statuses:?}");
}

#[tokio::test]
async fn step_by_step_exchange_reaches_every_state() {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::AcceptAny);
    assert_eq!(client.state(), ProbeState::Configured);

    client.connect().await.unwrap();
    assert_eq!(client.state(), ProbeState::Connected);

    let host = format!("Host: {}", app.target().address());
    client
        .set_request_lines(["GET /service/test HTTP/1.1", host.as_str(), "Connection: close", "", ""])
        .unwrap();
    client.send().await.unwrap();
    assert_eq!(client.state(), ProbeState::ResponseReceived);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ProbeState::Disconnected);
    assert!(client.is_response_200());
}

#[tokio::test]
async fn head_request_gets_headers_only() {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::AcceptAny);
    let request = app.browser_request("HEAD /service/test HTTP/1.1", END_OF_HEADERS);

    assert_ok!(client.exchange(request).await);

    let response = client.response().unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn unknown_path_is_not_a_200() {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::AcceptAny);
    let request = app.browser_request("GET /service/missing HTTP/1.1", END_OF_HEADERS);

    assert_ok!(client.exchange(request).await);

    assert!(!client.is_response_200());
    assert!(client.is_response_code(404));
}

#[tokio::test]
async fn garbage_request_line_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let mut client = app.probe(BodyCheck::AcceptAny);

    assert_ok!(client.exchange(ProbeRequest::from("NONSENSE\r\n\r\n")).await);

    assert!(client.is_response_code(400));
}

#[tokio::test]
async fn conventional_client_agrees_with_the_probe() {
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(app.base_url.join("service/test").unwrap())
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
    assert!(response.headers().contains_key("x-request-id"));
}
