//! End-to-end tests over the JSON-lines TCP transport.
//!
//! Each test binds a server on an ephemeral port, speaks the wire protocol
//! through real sockets, and asserts on the event stream a client observes.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};
use turnstile_core::ServerConfig;
use turnstile_server::Server;

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self { reader: BufReader::new(reader), writer }
    }

    async fn send(&mut self, event: &str, data: Value) {
        let mut line = serde_json::to_vec(&json!({ "event": event, "data": data })).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();
    }

    async fn read_event(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(
            Duration::from_secs(5),
            self.reader.read_line(&mut line),
        )
        .await
        .expect("timed out waiting for event")
        .unwrap();
        assert!(read > 0, "connection closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Read events until one with the given name arrives.
    async fn read_until(&mut self, event: &str) -> Value {
        for _ in 0..32 {
            let message = self.read_event().await;
            if message["event"] == event {
                return message;
            }
        }
        panic!("event {event} never arrived");
    }
}

async fn start_server(config_json: &str) -> SocketAddr {
    let config: ServerConfig = serde_json::from_str(config_json).unwrap();
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

#[tokio::test]
async fn announce_and_join_over_tcp() {
    let addr =
        start_server(r#"{ "port": 0, "rooms": [{ "id": "demo", "maxClients": 2 }] }"#).await;
    let mut client = Client::connect(addr).await;

    client.send("client.announce", json!({ "username": "olive" })).await;
    let announced = client.read_event().await;
    assert_eq!(announced["event"], "client.announced");
    assert_eq!(announced["data"]["username"], "olive");

    let rooms = client.read_event().await;
    assert_eq!(rooms["event"], "available-rooms");
    assert_eq!(rooms["data"][0]["id"], "demo");

    client.send("client.join", json!("demo")).await;
    let joined = client.read_event().await;
    assert_eq!(joined["event"], "room.joined");
    assert_eq!(joined["data"]["activeClients"].as_object().unwrap().len(), 1);

    // Every mutation is followed by the full snapshot broadcast
    let snapshot = client.read_event().await;
    assert_eq!(snapshot["event"], "room.demo.data");
}

#[tokio::test]
async fn queued_client_is_promoted_when_the_slot_frees() {
    let addr =
        start_server(r#"{ "port": 0, "rooms": [{ "id": "demo", "maxClients": 1 }] }"#).await;

    let mut first = Client::connect(addr).await;
    first.send("client.announce", json!({})).await;
    first.read_until("available-rooms").await;
    first.send("client.join", json!("demo")).await;
    first.read_until("room.joined").await;

    let mut second = Client::connect(addr).await;
    second.send("client.announce", json!({})).await;
    second.read_until("available-rooms").await;
    second.send("client.join", json!("demo")).await;
    let queued = second.read_until("room.queued").await;
    assert_eq!(queued["data"]["queue"].as_array().unwrap().len(), 1);

    first.send("client.leave", json!("demo")).await;
    first.read_until("room.left").await;

    let picked = second.read_until("room.picked").await;
    assert_eq!(picked["data"]["pickedClients"].as_array().unwrap().len(), 1);

    // Confirm the promotion by joining again
    second.send("client.join", json!("demo")).await;
    let joined = second.read_until("room.joined").await;
    assert!(joined["data"]["pickedClients"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn errors_are_unicast_to_the_requester() {
    let addr = start_server(r#"{ "port": 0 }"#).await;
    let mut client = Client::connect(addr).await;

    client.send("client.join", json!("nowhere")).await;
    let error = client.read_event().await;
    assert_eq!(error["event"], "_error");
    assert_eq!(error["data"]["status"], 401);
    assert_eq!(error["data"]["code"], "NOT_ANNOUNCED");
}

#[tokio::test]
async fn malformed_lines_do_not_kill_the_connection() {
    let addr = start_server(r#"{ "port": 0 }"#).await;
    let mut client = Client::connect(addr).await;

    client.writer.write_all(b"this is not json\n").await.unwrap();
    client.send("client.announce", json!({})).await;
    let announced = client.read_event().await;
    assert_eq!(announced["event"], "client.announced");
}

#[tokio::test]
async fn disconnect_frees_the_slot_for_the_queue() {
    let addr =
        start_server(r#"{ "port": 0, "rooms": [{ "id": "demo", "maxClients": 1 }] }"#).await;

    let mut first = Client::connect(addr).await;
    first.send("client.announce", json!({})).await;
    first.read_until("available-rooms").await;
    first.send("client.join", json!("demo")).await;
    first.read_until("room.joined").await;

    let mut second = Client::connect(addr).await;
    second.send("client.announce", json!({})).await;
    second.read_until("available-rooms").await;
    second.send("client.join", json!("demo")).await;
    second.read_until("room.queued").await;

    drop(first);
    second.read_until("room.picked").await;
}

#[test]
fn config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turnstile.json");
    std::fs::write(
        &path,
        r#"{
            "port": 4040,
            "maxRooms": 2,
            "allowNewRooms": false,
            "rooms": [{ "id": "lobby", "name": "Lobby", "maxClients": 4 }]
        }"#,
    )
    .unwrap();

    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config.port, 4040);
    assert_eq!(config.max_rooms, 2);
    assert!(!config.allow_new_rooms);
    assert_eq!(config.rooms[0].name.as_deref(), Some("Lobby"));
    assert_eq!(config.rooms[0].settings.max_clients, 4);
}
