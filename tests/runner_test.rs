//! End-to-end lifecycle tests: mock REST service plus scripted bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use accessfeed::cli::Mode;
use accessfeed::runner;
use accessfeed::Config;
use serde_json::json;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

use common::{
    business_event_frame, confirm_frame, next_observed, subscription_json, Observed, Recorder,
    ScriptedBridge,
};

fn config_for(server: &MockServer, bridge_endpoint: &str) -> Config {
    Config {
        service_uri: format!("{}/api/", server.uri()),
        bridge_uri: bridge_endpoint.to_string(),
        application_id: "app-1".to_string(),
        username: "operator".to_string(),
        password: Zeroizing::new("pw".to_string()),
        directory_id: "corp".to_string(),
        request_timeout_secs: 5,
        pause_on_exit: false,
        ..Config::default()
    }
}

async fn mount_session(server: &MockServer, logout_status: u16) {
    Mock::given(method("POST"))
        .and(path("/api/authentication"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_token": "tok-1"})))
        .expect(1)
        .mount(server)
        .await;

    let logout = if logout_status < 300 {
        ResponseTemplate::new(logout_status)
    } else {
        ResponseTemplate::new(logout_status).set_body_json(json!({
            "error": {"code": "SESSION", "message": "session already expired"}
        }))
    };
    Mock::given(method("DELETE"))
        .and(path("/api/authentication"))
        .respond_with(logout)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_add_run_delivers_events_and_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server, 204).await;
    Mock::given(method("POST"))
        .and(path("/api/event_subscriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(subscription_json(7, false)))
        .expect(1)
        .mount(&server)
        .await;

    let mut bridge = ScriptedBridge::start(vec![
        confirm_frame(),
        business_event_frame(json!({"door": "Front", "action": "open"})),
    ])
    .await;
    let config = config_for(&server, &bridge.endpoint);

    let (recorder, mut rx) = Recorder::new();
    let (seen_tx, seen_rx) = oneshot::channel();
    let stop = CancellationToken::new();
    let stop_after_event = stop.clone();
    tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let observed = next_observed(&mut rx).await;
            let done = matches!(observed, Observed::Received(_));
            seen.push(observed);
            if done {
                break;
            }
        }
        let _ = seen_tx.send(seen);
        stop_after_event.cancel();
    });

    let outcome = runner::run(&config, Mode::Add, Arc::clone(&recorder) as _, stop)
        .await
        .unwrap();

    assert!(outcome.listened);
    assert_eq!(outcome.subscription.id, 7);
    assert_eq!(recorder.ready(), vec![(7, true)]);

    let handshake = bridge.next_handshake().await;
    assert_eq!(handshake.headers.get("session_token").map(String::as_str), Some("tok-1"));

    let seen = seen_rx.await.unwrap();
    assert_eq!(seen[0], Observed::Established);
    match seen.last() {
        Some(Observed::Received(fields)) => {
            assert_eq!(fields["door"], "Front");
            assert_eq!(fields["action"], "open");
        }
        other => panic!("expected an event last, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disable_run_opens_no_bridge_and_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server, 204).await;
    Mock::given(method("DELETE"))
        .and(path("/api/event_subscriptions/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscription_json(42, true)))
        .expect(1)
        .mount(&server)
        .await;

    let mut bridge = ScriptedBridge::start(vec![confirm_frame()]).await;
    let config = config_for(&server, &bridge.endpoint);
    let (recorder, _rx) = Recorder::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        runner::run(
            &config,
            Mode::Disable { id: 42 },
            Arc::clone(&recorder) as _,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("disable must not wait for a stop signal")
    .unwrap();

    assert!(!outcome.listened);
    assert!(outcome.subscription.is_disabled);
    assert_eq!(recorder.ready(), vec![(42, false)]);
    assert!(bridge.handshakes.try_recv().is_err());
}

#[tokio::test]
async fn test_provisioning_failure_still_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server, 204).await;
    Mock::given(method("PUT"))
        .and(path("/api/event_subscriptions/42"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "E1", "message": "bad filter"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, "ws://127.0.0.1:1/bridge");
    let (recorder, _rx) = Recorder::new();

    let err = runner::run(&config, Mode::Modify { id: 42 }, recorder, CancellationToken::new())
        .await
        .unwrap_err();

    let rendered = format!("{err:#}");
    assert!(rendered.contains("failed to modify subscription 42"), "{rendered}");
    assert!(rendered.contains("service fault E1: bad filter"), "{rendered}");
}

#[tokio::test]
async fn test_log_out_failure_after_success_is_returned() {
    let server = MockServer::start().await;
    mount_session(&server, 409).await;
    Mock::given(method("DELETE"))
        .and(path("/api/event_subscriptions/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscription_json(42, true)))
        .mount(&server)
        .await;

    let config = config_for(&server, "ws://127.0.0.1:1/bridge");
    let (recorder, _rx) = Recorder::new();

    let err = runner::run(&config, Mode::Disable { id: 42 }, recorder, CancellationToken::new())
        .await
        .unwrap_err();

    let rendered = format!("{err:#}");
    assert!(rendered.contains("log out failed"), "{rendered}");
    assert!(rendered.contains("SESSION"), "{rendered}");
}

#[tokio::test]
async fn test_authentication_failure_skips_everything_else() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/authentication"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "AUTH01", "message": "invalid credentials"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/authentication"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server, "ws://127.0.0.1:1/bridge");
    let (recorder, _rx) = Recorder::new();

    let err = runner::run(&config, Mode::Add, recorder, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("invalid credentials"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unprovisioned_subscription_does_not_listen() {
    let server = MockServer::start().await;
    mount_session(&server, 204).await;
    let mut pending = subscription_json(9, false);
    pending["queue_name"] = serde_json::Value::Null;
    Mock::given(method("POST"))
        .and(path("/api/event_subscriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(pending))
        .mount(&server)
        .await;

    let config = config_for(&server, "ws://127.0.0.1:1/bridge");
    let (recorder, _rx) = Recorder::new();

    let outcome = runner::run(&config, Mode::Add, recorder, CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.listened);
}

#[tokio::test]
async fn test_stop_before_provisioning_skips_it_and_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server, 204).await;
    Mock::given(method("POST"))
        .and(path("/api/event_subscriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(subscription_json(7, false)))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server, "ws://127.0.0.1:1/bridge");
    let (recorder, _rx) = Recorder::new();
    let stop = CancellationToken::new();
    stop.cancel();

    let err = runner::run(&config, Mode::Add, Arc::clone(&recorder) as _, stop)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("stopped before"), "{err:#}");
    assert!(recorder.ready().is_empty());
}
