//! Stream Client Backoff Integration Tests
//!
//! Drives `StreamClient` against a scripted connector with paused time and
//! checks the reconnect schedule.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{CONNECTION_LIMIT, DATA_A, Plan, ScriptedConnector, frames, stream_config, token};
use filtered_stream_proxy::{
    ConnectionState, ReconnectConfig, RingBuffer, SessionId, StreamClient, StreamClientConfig,
    StreamError, StreamExit, StreamItem,
};

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

fn spawn_client(
    connector: Arc<ScriptedConnector>,
    config: StreamClientConfig,
) -> (
    Arc<StreamClient>,
    Arc<RingBuffer<StreamItem>>,
    tokio::task::JoinHandle<StreamExit>,
) {
    let buffer = Arc::new(RingBuffer::new(10).unwrap());
    let client = Arc::new(StreamClient::new(
        SessionId::generate(),
        token("backoff-token"),
        connector,
        Arc::clone(&buffer),
        config,
        CancellationToken::new(),
    ));

    let task = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    (client, buffer, task)
}

#[tokio::test(start_paused = true)]
async fn consecutive_failures_double_the_delay() {
    let connector = ScriptedConnector::failing_after(Vec::new());
    let (client, _, task) = spawn_client(Arc::clone(&connector), stream_config());

    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(connector.gaps(), secs(&[1, 2, 4, 8]));
    assert_eq!(client.state(), ConnectionState::Backoff);
    assert_eq!(client.retry_count(), 5);

    client.stop();
    assert_eq!(task.await.unwrap(), StreamExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn delay_is_capped() {
    let connector = ScriptedConnector::failing_after(Vec::new());
    let config = StreamClientConfig {
        reconnect: ReconnectConfig::exponential(Duration::from_secs(1), Duration::from_secs(4)),
        stall_timeout: None,
    };
    let (client, _, task) = spawn_client(Arc::clone(&connector), config);

    tokio::time::sleep(Duration::from_secs(16)).await;

    // attempts at 0, 1, 3, 7, 11, 15
    assert_eq!(connector.gaps(), secs(&[1, 2, 4, 4, 4]));

    client.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn data_frame_resets_backoff() {
    let reset = || Plan::Fail(StreamError::Reset("refused".to_string()));
    let connector = ScriptedConnector::failing_after(vec![
        reset(),
        reset(),
        Plan::Close(frames(&[DATA_A])),
    ]);
    let (client, buffer, task) = spawn_client(Arc::clone(&connector), stream_config());

    tokio::time::sleep(Duration::from_secs(6) + Duration::from_millis(500)).await;

    // fail, 1s, fail, 2s, data then close, 1s, fail, 2s
    assert_eq!(connector.gaps(), secs(&[1, 2, 1, 2]));
    assert_eq!(buffer.len(), 1);

    client.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn keep_alive_frames_do_not_reset_backoff() {
    let connector = ScriptedConnector::failing_after(vec![
        Plan::Fail(StreamError::Reset("refused".to_string())),
        Plan::Close(frames(&["", "not json"])),
    ]);
    let (client, buffer, task) = spawn_client(Arc::clone(&connector), stream_config());

    tokio::time::sleep(Duration::from_secs(7) + Duration::from_millis(500)).await;

    assert_eq!(connector.gaps(), secs(&[1, 2, 4]));
    assert!(buffer.is_empty());

    client.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connection_limit_mid_stream_is_not_retried() {
    let connector =
        ScriptedConnector::failing_after(vec![Plan::Hold(frames(&[DATA_A, CONNECTION_LIMIT]))]);
    let (client, buffer, task) = spawn_client(Arc::clone(&connector), stream_config());

    let exit = task.await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(exit, StreamExit::Fatal(StreamError::ConnectionLimit));
    assert_eq!(client.state(), ConnectionState::Terminated);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(buffer.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_cancels_the_timer() {
    let connector = ScriptedConnector::failing_after(Vec::new());
    let config = StreamClientConfig {
        reconnect: ReconnectConfig::exponential(Duration::from_secs(60), Duration::from_secs(60)),
        stall_timeout: None,
    };
    let (client, _, task) = spawn_client(Arc::clone(&connector), config);

    let mut state = client.subscribe_state();
    state
        .wait_for(|s| *s == ConnectionState::Backoff)
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    client.stop();
    client.stop();
    assert_eq!(task.await.unwrap(), StreamExit::Stopped);

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stall_watchdog_resets_silent_connection() {
    let connector = ScriptedConnector::failing_after(vec![Plan::Hold(Vec::new())]);
    let config = StreamClientConfig {
        stall_timeout: Some(Duration::from_secs(30)),
        ..stream_config()
    };
    let (client, _, task) = spawn_client(Arc::clone(&connector), config);

    tokio::time::sleep(Duration::from_secs(31) + Duration::from_millis(500)).await;

    // silent 30s, backoff 1s, refused
    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.gaps(), secs(&[31]));

    client.stop();
    task.await.unwrap();
}
