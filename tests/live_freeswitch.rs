//! Integration tests against a live FreeSWITCH instance.
//!
//! These tests require FreeSWITCH ESL on 127.0.0.1:8022 with password ClueCon.
//! Run with: cargo test --test live_freeswitch -- --ignored

use freeswitch_esl_session::{
    handler_fn, EslCommand, EslError, EslEvent, EslSession, HandlerRegistry, ReplyStatus,
    SessionOptions, SessionPool,
};
use std::time::Duration;
use tokio::sync::mpsc;

const ESL_ADDRESS: &str = "127.0.0.1:8022";
const ESL_PASSWORD: &str = "ClueCon";

fn options() -> SessionOptions {
    let mut options = SessionOptions::new(ESL_ADDRESS, ESL_PASSWORD);
    options.command_timeout_ms = 10_000;
    options
}

async fn connect(handlers: HandlerRegistry) -> EslSession {
    EslSession::connect(options(), handlers)
        .await
        .expect("failed to connect to FreeSWITCH")
}

/// Registry forwarding every event named `name` into a channel.
fn forward(name: &str) -> (HandlerRegistry, mpsc::UnboundedReceiver<EslEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new().on(
        name,
        handler_fn(move |event| {
            let _ = tx.send(event);
            async {}
        }),
    );
    (registry, rx)
}

#[tokio::test]
#[ignore]
async fn live_connect_and_status() {
    let session = connect(HandlerRegistry::new()).await;
    assert!(session.is_connected());

    let body = session
        .api("status")
        .await
        .unwrap();
    assert!(body.contains("UP"), "expected UP in status: {}", body);
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_wrong_password() {
    let mut opts = options();
    opts.password = "definitely-not-the-password".into();
    let err = EslSession::connect(opts, HandlerRegistry::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, EslError::AuthFailed { .. }),
        "expected AuthFailed, got: {:?}",
        err
    );
}

#[tokio::test]
#[ignore]
async fn live_heartbeat_reaches_handler() {
    let (handlers, mut events) = forward("HEARTBEAT");
    let session = connect(handlers).await;

    let event = tokio::time::timeout(Duration::from_secs(25), events.recv())
        .await
        .expect("timeout waiting for heartbeat")
        .expect("channel closed");

    assert_eq!(event.name(), "HEARTBEAT");
    assert!(event
        .header("Core-UUID")
        .is_some());
    assert!(event
        .to_map(&[])
        .contains_key("Event-Date-Timestamp"));
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_bgapi_result_arrives_as_background_job() {
    let (handlers, mut events) = forward("BACKGROUND_JOB");
    let session = connect(handlers).await;

    let job_uuid = session
        .bgapi("status")
        .await
        .unwrap();

    let event = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timeout waiting for BACKGROUND_JOB")
            .expect("channel closed");
        if event
            .job_uuid()
            .as_deref()
            == Some(job_uuid.as_str())
        {
            break event;
        }
    };
    assert!(event
        .inner_body()
        .unwrap_or("")
        .contains("UP"));
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_api_multiple_commands() {
    let session = connect(HandlerRegistry::new()).await;

    for command in ["version", "hostname", "global_getvar"] {
        let body = session
            .api(command)
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", command, e));
        assert!(!body.is_empty(), "{} should have body", command);
    }
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_reply_status_err() {
    let session = connect(HandlerRegistry::new()).await;

    // an invalid log level triggers -ERR in Reply-Text
    let reply = session
        .send_command(EslCommand::Raw {
            line: "log BOGUS_LEVEL_12345".into(),
        })
        .await
        .expect("send_command should not fail at transport level");
    assert_eq!(
        reply.reply_status(),
        ReplyStatus::Err,
        "expected -ERR reply, got: {:?}",
        reply.reply_text()
    );

    let err = session
        .send_raw("log BOGUS_LEVEL_12345")
        .await
        .unwrap_err();
    assert!(
        matches!(err, EslError::CommandFailed { .. }),
        "expected CommandFailed, got: {:?}",
        err
    );
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_api_err_body() {
    let session = connect(HandlerRegistry::new()).await;

    let err = session
        .api("nonexistent_command_xyz")
        .await
        .unwrap_err();
    assert!(
        matches!(err, EslError::CommandFailed { ref reply_text } if reply_text.contains("-ERR")),
        "expected CommandFailed, got: {:?}",
        err
    );
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_runtime_filter_accepted() {
    let session = connect(HandlerRegistry::new()).await;
    session
        .filter("Event-Name", "HEARTBEAT")
        .await
        .expect("filter should return +OK");
    session
        .noop()
        .await
        .unwrap();
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_disconnect_reconnects() {
    let (handlers, mut events) = forward("HEARTBEAT");
    let session = connect(handlers).await;

    session
        .disconnect()
        .await;
    for _ in 0..100 {
        if session.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(session.is_connected(), "status: {}", session.status());

    // subscriptions are restored on the new socket
    tokio::time::timeout(Duration::from_secs(25), events.recv())
        .await
        .expect("no heartbeat after reconnect")
        .expect("channel closed");
    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_pool_show_channels() {
    let pool = SessionPool::new(options(), 2);
    let session = pool
        .acquire(Duration::from_secs(5))
        .await
        .unwrap();
    let table = session
        .api("show channels")
        .await
        .unwrap();
    // every parsed row carries the header columns
    for row in freeswitch_esl_session::map_chan_data(&table) {
        assert!(row.contains_key("uuid"));
    }
    drop(session);
    pool.close()
        .await;
}
