// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use syslog_forwarder::{
    batcher::Batcher,
    deliverer::Deliverer,
    listener::{Listener, ListenerConfig},
    log_store::{CloudWatchLogsFactory, LogStoreFactory},
    stream::StreamInitializer,
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, UdpSocket},
    time::{sleep, timeout, Duration},
};
use tokio_util::sync::CancellationToken;

const CREATE_TARGET: &str = "Logs_20140328.CreateLogStream";
const PUT_TARGET: &str = "Logs_20140328.PutLogEvents";

fn factory(url: String) -> Arc<dyn LogStoreFactory> {
    Arc::new(CloudWatchLogsFactory::new(
        url,
        Duration::from_secs(5),
        None,
    ))
}

fn listener_config() -> ListenerConfig {
    ListenerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

#[cfg(test)]
#[tokio::test]
async fn forwarder_ships_udp_and_tcp_messages_in_timestamp_order() {
    let mut mock_server = Server::new_async().await;

    let create = mock_server
        .mock("POST", "/")
        .match_header("X-Amz-Target", CREATE_TARGET)
        .match_body(Matcher::PartialJson(json!({"logGroupName": "syslog"})))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let put = mock_server
        .mock("POST", "/")
        .match_header("X-Amz-Target", PUT_TARGET)
        .match_header("Content-Type", "application/x-amz-json-1.1")
        .match_body(Matcher::PartialJson(json!({
            "logGroupName": "syslog",
            "logEvents": [
                {"message": "h app [1]: over udp", "timestamp": 1_704_067_201_000_i64},
                {"message": "h app [2]: over tcp", "timestamp": 1_704_067_202_000_i64},
            ],
        })))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"next-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let factory = factory(mock_server.url());
    let stream = StreamInitializer::new(factory.clone(), "syslog".to_string())
        .initialize(Some("edge"))
        .await
        .expect("failed to create stream");
    assert!(stream.starts_with("edge-"));
    create.assert_async().await;

    // Long interval: everything goes out in the drain on shutdown
    let deliverer = Deliverer::new(factory, "syslog".to_string(), stream);
    let (batcher, ingest) = Batcher::new(deliverer, Duration::from_secs(60));
    let cancel_token = CancellationToken::new();
    let listener = Listener::bind(&listener_config(), ingest, cancel_token.clone())
        .await
        .expect("failed to bind listener");
    let udp_addr = listener.udp_local_addr().expect("no udp address");
    let tcp_addr = listener.tcp_local_addr().expect("no tcp address");

    let batcher_task = tokio::spawn(batcher.run());
    let listener_task = tokio::spawn(listener.spin());

    let mut tcp = TcpStream::connect(tcp_addr)
        .await
        .expect("failed to connect");
    tcp.write_all(b"<14>1 2024-01-01T00:00:02Z h app 2 - - over tcp\n")
        .await
        .expect("failed to write");
    tcp.shutdown().await.expect("failed to shutdown");

    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind UDP socket");
    socket
        .send_to(b"<14>1 2024-01-01T00:00:01Z h app 1 - - over udp", udp_addr)
        .await
        .expect("unable to send");

    sleep(Duration::from_millis(300)).await;
    cancel_token.cancel();

    timeout(Duration::from_secs(2), listener_task)
        .await
        .expect("listener did not stop")
        .expect("listener task failed");
    timeout(Duration::from_secs(5), batcher_task)
        .await
        .expect("batcher did not drain")
        .expect("batcher task failed");

    put.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn forwarder_recovers_from_stale_sequence_token() {
    let mut mock_server = Server::new_async().await;

    let rejected = mock_server
        .mock("POST", "/")
        .match_header("X-Amz-Target", PUT_TARGET)
        .match_body(Matcher::PartialJson(json!({
            "logEvents": [{"message": "h app [1]: first", "timestamp": 1_704_067_201_000_i64}],
        })))
        .with_status(400)
        .with_body(
            r#"{"__type":"com.amazonaws.logs#InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: abc123"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let accepted = mock_server
        .mock("POST", "/")
        .match_header("X-Amz-Target", PUT_TARGET)
        .match_body(Matcher::PartialJson(json!({
            "sequenceToken": "abc123",
            "logEvents": [{"message": "h app [2]: second", "timestamp": 1_704_067_202_000_i64}],
        })))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"def456"}"#)
        .expect(1)
        .create_async()
        .await;

    let deliverer = Deliverer::new(
        factory(mock_server.url()),
        "syslog".to_string(),
        "stream".to_string(),
    );
    let (batcher, ingest) = Batcher::new(deliverer, Duration::from_millis(100));
    let cancel_token = CancellationToken::new();
    let listener = Listener::bind(&listener_config(), ingest, cancel_token.clone())
        .await
        .expect("failed to bind listener");
    let udp_addr = listener.udp_local_addr().expect("no udp address");

    let batcher_task = tokio::spawn(batcher.run());
    let listener_task = tokio::spawn(listener.spin());

    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind UDP socket");
    socket
        .send_to(b"<14>1 2024-01-01T00:00:01Z h app 1 - - first", udp_addr)
        .await
        .expect("unable to send");
    sleep(Duration::from_millis(500)).await;
    rejected.assert_async().await;

    socket
        .send_to(b"<14>1 2024-01-01T00:00:02Z h app 2 - - second", udp_addr)
        .await
        .expect("unable to send");
    sleep(Duration::from_millis(500)).await;
    accepted.assert_async().await;

    cancel_token.cancel();
    let _ = timeout(Duration::from_secs(2), listener_task).await;
    let _ = timeout(Duration::from_secs(2), batcher_task).await;
}
