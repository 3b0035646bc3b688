mod common;

use taskq::storage::Storage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_basic_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("ADD q1 5 hello").await, "0");
    assert_eq!(server.send("ADD q1 5 world").await, "1");
    assert_eq!(server.send("GET q1").await, "0 5 hello");
    assert_eq!(server.send("GET q1").await, "1 5 world");
    assert_eq!(server.send("GET q1").await, "NONE");
    assert_eq!(server.send("ACK q1 0").await, "YES");
    assert_eq!(server.send("ACK q1 0").await, "NO");
    assert_eq!(server.send("IN q1 1").await, "YES");

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_queue_and_task() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("GET nothing").await, "NONE");
    assert_eq!(server.send("ACK nothing 0").await, "NO");
    assert_eq!(server.send("IN nothing 0").await, "NO");

    assert_eq!(server.send("ADD q 1 a").await, "0");
    assert_eq!(server.send("ACK q 7").await, "NO");
    assert_eq!(server.send("IN q 7").await, "NO");

    server.stop().await;
}

#[tokio::test]
async fn test_queues_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("ADD a 1 x").await, "0");
    assert_eq!(server.send("ADD b 1 y").await, "0");
    assert_eq!(server.send("ADD a 1 z").await, "1");
    assert_eq!(server.send("GET b").await, "0 1 y");
    assert_eq!(server.send("GET b").await, "NONE");
    assert_eq!(server.send("GET a").await, "0 1 x");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_commands_reply_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    for request in [
        "HELLO",
        "get q1",
        "ADD q1",
        "ADD q1 5",
        "ADD q1 five hello",
        "GET",
        "GET a b",
        "ACK q1",
        "ACK q1 zero",
        "IN q1 1 2",
        "SAVE now",
    ] {
        assert_eq!(server.send(request).await, "ERROR", "request {request:?}");
    }

    assert_eq!(server.state.storage.snapshot().await.queues.len(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_payload_with_spaces() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("ADD q1 11 hello world\n").await, "0");
    assert_eq!(server.send("GET q1").await, "0 11 hello world");

    let task_id = server.client.add("q1", "a b  c").await.unwrap();
    let task = server.client.get("q1").await.unwrap().unwrap();
    assert_eq!(task.id, task_id);
    assert_eq!(task.length, 6);
    assert_eq!(task.payload, "a b  c");

    server.stop().await;
}

#[tokio::test]
async fn test_declared_length_is_not_verified() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("ADD q1 99 short").await, "0");
    assert_eq!(server.send("GET q1").await, "0 99 short");

    server.stop().await;
}

#[tokio::test]
async fn test_empty_request_closes_without_reply() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_client_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;
    let client = &server.client;

    assert_eq!(client.add("jobs", "one").await.unwrap(), 0);
    assert_eq!(client.add("jobs", "two").await.unwrap(), 1);

    let leased = client.get("jobs").await.unwrap().unwrap();
    assert_eq!(leased.payload, "one");
    assert!(client.is_in("jobs", leased.id).await.unwrap());
    assert!(client.ack("jobs", leased.id).await.unwrap());
    assert!(!client.is_in("jobs", leased.id).await.unwrap());
    assert!(!client.ack("jobs", leased.id).await.unwrap());

    client.save().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_request_replies_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with(dir.path(), 300, &["--max-request-bytes", "64"]);
    let server = common::start_config(&config, Default::default()).await;

    let payload = "x".repeat(4 * 1024 * 1024);
    let request = format!("ADD big {} {}", payload.len(), payload);
    assert_eq!(server.client.send(&request).await.unwrap(), "ERROR");
    assert_eq!(server.state.storage.snapshot().await.queues.len(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_client_rejects_payloads_the_server_would_trim() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;
    let client = &server.client;

    for payload in ["", "  padded  ", "trailing\n", "\tleading"] {
        assert!(matches!(
            client.add("jobs", payload).await,
            Err(taskq::client::ClientError::InvalidPayload)
        ));
    }
    assert_eq!(client.get("jobs").await.unwrap(), None);

    assert_eq!(client.add("jobs", "inner  spaces").await.unwrap(), 0);
    let leased = client.get("jobs").await.unwrap().unwrap();
    assert_eq!(leased.payload, "inner  spaces");
    assert_eq!(leased.length, 13);

    server.stop().await;
}

#[tokio::test]
async fn test_task_ids_with_leading_zeros_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    assert_eq!(server.send("ADD q 1 a").await, "0");
    assert_eq!(server.send("ACK q 00").await, "ERROR");
    assert_eq!(server.send("IN q 00").await, "ERROR");
    assert_eq!(server.send("IN q 0").await, "YES");
    assert_eq!(server.send("ACK q 0").await, "YES");

    server.stop().await;
}
