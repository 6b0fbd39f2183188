//! Broker tests over real TCP with request clients and workers.

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use chorus_client::{Participant, RequestClient, Worker};
use chorus_proto::Envelope;
use chorus_server::{Broker, BrokerConfig, SystemEnv};
use serde_json::{Map, Value, json};
use tokio::net::{TcpListener, TcpStream};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start() -> (SocketAddr, SocketAddr) {
    let frontend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker = Broker::new(frontend, backend, SystemEnv::new(), BrokerConfig::default());
    let addrs = (broker.frontend_addr().unwrap(), broker.backend_addr().unwrap());
    tokio::spawn(broker.run());
    addrs
}

async fn client(addr: SocketAddr) -> RequestClient<TcpStream, SystemEnv> {
    RequestClient::connect(addr, Participant::new(SystemEnv::new())).await.unwrap()
}

/// Worker that echoes the request data and tags it with `id`.
fn spawn_echo_worker(addr: SocketAddr, id: &'static str) {
    tokio::spawn(async move {
        let mut worker = Worker::connect(addr, Participant::new(SystemEnv::new())).await.unwrap();
        worker
            .serve(|request| {
                let mut data = request.data.clone();
                data.insert("worker".into(), json!(id));
                Envelope::new(request.service.clone(), data)
            })
            .await
    });
}

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::test]
async fn request_reaches_worker_and_reply_returns() {
    let (frontend, backend) = start().await;
    spawn_echo_worker(backend, "w1");

    let mut client = client(frontend).await;
    let reply = client
        .request("login", data(json!({ "user": "alice", "extra": [1, 2, 3] })), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(reply.service, "login");
    assert_eq!(reply.data["user"], json!("alice"));
    assert_eq!(reply.data["extra"], json!([1, 2, 3]));
    assert_eq!(reply.data["worker"], json!("w1"));
}

#[tokio::test]
async fn reply_clock_follows_request_clock() {
    let (frontend, backend) = start().await;
    spawn_echo_worker(backend, "w1");

    let mut client = client(frontend).await;
    for _ in 0..3 {
        let sent = client.participant().clock();
        let reply = client.request("users", Map::new(), TIMEOUT).await.unwrap();
        assert!(reply.clock() > sent + 1, "worker must observe the request clock");
        assert!(client.participant().clock() > reply.clock());
    }
}

#[tokio::test]
async fn request_waits_for_first_worker() {
    let (frontend, backend) = start().await;

    let waiting = tokio::spawn(async move {
        let mut client = client(frontend).await;
        client.request("channels", Map::new(), TIMEOUT).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    spawn_echo_worker(backend, "late");

    let reply = waiting.await.unwrap().unwrap();
    assert_eq!(reply.data["worker"], json!("late"));
}

#[tokio::test]
async fn replies_go_to_the_client_that_asked() {
    let (frontend, backend) = start().await;
    spawn_echo_worker(backend, "w1");

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                let mut client = client(frontend).await;
                let reply = client
                    .request("login", data(json!({ "user": format!("user_{i}") })), TIMEOUT)
                    .await
                    .unwrap();
                assert_eq!(reply.data["user"], json!(format!("user_{i}")));
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn requests_are_spread_over_workers() {
    let (frontend, backend) = start().await;
    spawn_echo_worker(backend, "w1");
    spawn_echo_worker(backend, "w2");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = client(frontend).await;
    let mut seen = HashSet::new();
    for _ in 0..4 {
        let reply = client.request("users", Map::new(), TIMEOUT).await.unwrap();
        if let Some(worker) = reply.data["worker"].as_str() {
            seen.insert(worker.to_string());
        }
    }

    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn surviving_worker_takes_over() {
    let (frontend, backend) = start().await;

    let doomed = tokio::spawn(async move {
        let mut worker = Worker::connect(backend, Participant::new(SystemEnv::new())).await.unwrap();
        worker.serve(|request| request.clone()).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    doomed.abort();
    let _ = doomed.await;

    spawn_echo_worker(backend, "survivor");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = client(frontend).await;
    for _ in 0..3 {
        let reply = client.request("users", Map::new(), TIMEOUT).await.unwrap();
        assert_eq!(reply.data["worker"], json!("survivor"));
    }
}
