use super::*;
use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct Relay {
    received: Arc<Mutex<Vec<Value>>>,
}

async fn accept(State(relay): State<Relay>, Json(body): Json<Value>) -> StatusCode {
    relay.received.lock().await.push(body);
    StatusCode::ACCEPTED
}

async fn refuse() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_relay() -> Result<(String, Relay)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let relay = Relay::default();
    let app = Router::new()
        .route("/send", post(accept))
        .route("/down", post(refuse))
        .with_state(relay.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), relay))
}

fn envelope() -> Envelope {
    Envelope {
        to: "niels@example.org".into(),
        subject: "Request submitted for approval".into(),
        body: "Dear Niels".into(),
    }
}

#[tokio::test]
async fn relay_receives_sender_and_envelope() {
    let (server_url, relay) = spawn_relay().await.expect("spawn relay");
    let endpoint = Url::parse(&format!("{server_url}/send")).expect("url");
    let mailer = MailRelay::new(endpoint, "requests@example.org");

    let status = mailer.send(envelope()).await;
    assert_eq!(status, MailStatus::Sent);

    let received = relay.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["from"], "requests@example.org");
    assert_eq!(received[0]["to"], "niels@example.org");
    assert_eq!(received[0]["subject"], "Request submitted for approval");
}

#[tokio::test]
async fn relay_errors_become_failed_status() {
    let (server_url, _relay) = spawn_relay().await.expect("spawn relay");
    let endpoint = Url::parse(&format!("{server_url}/down")).expect("url");
    let mailer = MailRelay::new(endpoint, "requests@example.org");

    let status = mailer.send(envelope()).await;
    assert!(matches!(status, MailStatus::Failed(reason) if reason.contains("503")));
}

#[tokio::test]
async fn log_mailer_always_succeeds() {
    assert_eq!(LogMailer.send(envelope()).await, MailStatus::Sent);
}
