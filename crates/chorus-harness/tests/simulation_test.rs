//! Deterministic simulations of the Chorus services.
//!
//! Every test runs the production accept loops over turmoil's simulated
//! network, so liveness timeouts measured in tens of seconds complete in
//! virtual time.
//!
//! # Oracle Pattern
//!
//! Participants record what they observe; each test ends with an oracle
//! over those observations:
//! - Ranks are unique and stable per name
//! - Silent servers disappear from the list, live ones stay
//! - Subscribers only see topics matching their prefixes

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use chorus_client::{Participant, Publisher, ReferenceClient, RequestClient, Subscriber, Worker};
use chorus_harness::{SimEnv, SimListener, connect};
use chorus_proto::Envelope;
use chorus_server::{Broker, BrokerConfig, Proxy, ProxyConfig, ReferenceConfig, ReferenceService};
use serde_json::{Map, json};
use turmoil::net::TcpStream;

type Observations<T> = Arc<Mutex<Vec<T>>>;

fn register_reference(sim: &mut turmoil::Sim<'_>, config: ReferenceConfig) {
    sim.host("reference", move || {
        let config = config.clone();
        async move {
            let listener = SimListener::bind("0.0.0.0:5559").await?;
            ReferenceService::new(listener, SimEnv::new(), config).run().await?;
            Ok(())
        }
    });
}

async fn reference_client(
    name: &str,
) -> Result<ReferenceClient<TcpStream, SimEnv>, Box<dyn std::error::Error>> {
    let stream = connect("reference:5559").await?;
    let requests = RequestClient::new(stream, Participant::new(SimEnv::new()));
    Ok(ReferenceClient::new(requests, name))
}

/// Oracle: no two names share a rank and every name kept its first rank.
fn verify_unique_ranks(observed: &[(String, u64)]) {
    let mut by_name = std::collections::HashMap::new();
    for (name, rank) in observed {
        let first = by_name.entry(name.clone()).or_insert(*rank);
        assert_eq!(first, rank, "rank of {name} changed without eviction");
    }

    let ranks: HashSet<_> = by_name.values().collect();
    assert_eq!(ranks.len(), by_name.len(), "rank handed out twice: {by_name:?}");
}

#[test]
fn silent_server_is_evicted_in_virtual_time() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(300))
        .rng_seed(42)
        .build();

    register_reference(&mut sim, ReferenceConfig::default());

    sim.client("quiet", async {
        let mut client = reference_client("quiet").await?;
        assert_eq!(client.rank().await?, 1);
        Ok(())
    });

    sim.client("steady", async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let mut client = reference_client("steady").await?;
        let rank = client.rank().await?;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            client.heartbeat().await?;
        }

        // 60 s in: quiet has been silent for twice the timeout.
        let list = client.list().await?;
        let names: Vec<_> = list.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["steady"]);
        assert_eq!(list[0].rank, rank);
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn heartbeat_inside_timeout_keeps_server_listed() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(300))
        .rng_seed(7)
        .build();

    register_reference(&mut sim, ReferenceConfig::default());

    sim.client("server", async {
        let mut client = reference_client("slow-but-alive").await?;
        let rank = client.rank().await?;

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(25)).await;
            client.heartbeat().await?;
        }

        assert_eq!(client.rank().await?, rank);
        assert_eq!(client.list().await?.len(), 1);
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn evicted_server_re_registers_with_new_rank() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(300))
        .rng_seed(11)
        .build();

    register_reference(&mut sim, ReferenceConfig::default());

    sim.client("server", async {
        let mut client = reference_client("phoenix").await?;
        let before = client.rank().await?;

        tokio::time::sleep(Duration::from_secs(60)).await;

        // A heartbeat from an evicted name registers it afresh.
        client.heartbeat().await?;
        let after = client.rank().await?;
        assert!(after > before, "expected a fresh rank, got {after} after {before}");
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn concurrent_first_contact_under_latency() {
    let observed: Observations<(String, u64)> = Arc::default();

    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(120))
        .min_message_latency(Duration::from_millis(5))
        .max_message_latency(Duration::from_millis(50))
        .rng_seed(1234)
        .build();

    register_reference(&mut sim, ReferenceConfig::default());

    for i in 0..6 {
        let observed = Arc::clone(&observed);
        sim.client(format!("server-{i}"), async move {
            let name = format!("server-{}", i % 3);
            let mut client = reference_client(&name).await?;
            for _ in 0..3 {
                let rank = client.rank().await?;
                observed.lock().unwrap().push((name.clone(), rank));
            }
            Ok(())
        });
    }

    sim.run().expect("simulation should complete");

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 18);
    verify_unique_ranks(&observed);
}

#[test]
fn same_seed_same_rank_order() {
    fn run(seed: u64) -> Vec<(String, u64)> {
        let observed: Observations<(String, u64)> = Arc::default();

        let mut sim = turmoil::Builder::new()
            .simulation_duration(Duration::from_secs(60))
            .min_message_latency(Duration::from_millis(1))
            .max_message_latency(Duration::from_millis(40))
            .rng_seed(seed)
            .build();

        register_reference(&mut sim, ReferenceConfig::default());

        for i in 0..4 {
            let observed = Arc::clone(&observed);
            sim.client(format!("server-{i}"), async move {
                let name = format!("server-{i}");
                let mut client = reference_client(&name).await?;
                let rank = client.rank().await?;
                observed.lock().unwrap().push((name, rank));
                Ok(())
            });
        }

        sim.run().expect("simulation should complete");
        observed.lock().unwrap().clone()
    }

    assert_eq!(run(99), run(99));
}

fn register_broker(sim: &mut turmoil::Sim<'_>) {
    sim.host("broker", || async {
        let frontend = SimListener::bind("0.0.0.0:5555").await?;
        let backend = SimListener::bind("0.0.0.0:5556").await?;
        Broker::new(frontend, backend, SimEnv::new(), BrokerConfig::default()).run().await?;
        Ok(())
    });
}

fn register_worker(sim: &mut turmoil::Sim<'_>, name: &'static str) {
    sim.host(name, move || async move {
        let stream = connect("broker:5556").await?;
        let mut worker = Worker::new(stream, Participant::new(SimEnv::new()));
        worker
            .serve(|request| {
                let mut data = request.data.clone();
                data.insert("worker".into(), json!(name));
                Envelope::new(request.service.clone(), data)
            })
            .await?;
        Ok(())
    });
}

#[test]
fn broker_spreads_requests_over_workers() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(60))
        .rng_seed(5)
        .build();

    register_broker(&mut sim);
    register_worker(&mut sim, "worker-a");
    register_worker(&mut sim, "worker-b");

    sim.client("client", async {
        // Let both workers attach first.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stream = connect("broker:5555").await?;
        let mut client = RequestClient::new(stream, Participant::new(SimEnv::new()));

        let mut served_by = Vec::new();
        for i in 0..6 {
            let Some(data) = json!({ "seq": i }).as_object().cloned() else { unreachable!() };
            let reply = client.request("users", data, Duration::from_secs(5)).await?;
            assert_eq!(reply.data["seq"], json!(i));
            served_by.push(reply.data["worker"].as_str().unwrap_or_default().to_string());
        }

        // Oracle: strict alternation between the two workers.
        for pair in served_by.windows(2) {
            assert_ne!(pair[0], pair[1], "round robin broken: {served_by:?}");
        }
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn broker_holds_requests_until_a_worker_arrives() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(60))
        .rng_seed(6)
        .build();

    register_broker(&mut sim);

    sim.host("late-worker", || async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let stream = connect("broker:5556").await?;
        let mut worker = Worker::new(stream, Participant::new(SimEnv::new()));
        worker.serve(|request| request.clone()).await?;
        Ok(())
    });

    sim.client("client", async {
        let stream = connect("broker:5555").await?;
        let mut client = RequestClient::new(stream, Participant::new(SimEnv::new()));

        let reply = client.request("channels", Map::new(), Duration::from_secs(10)).await?;
        assert_eq!(reply.service, "channels");
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn proxy_filters_by_topic() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(60))
        .rng_seed(8)
        .build();

    sim.host("proxy", || async {
        let frontend = SimListener::bind("0.0.0.0:5557").await?;
        let backend = SimListener::bind("0.0.0.0:5558").await?;
        Proxy::new(frontend, backend, SimEnv::new(), ProxyConfig::default()).run().await?;
        Ok(())
    });

    sim.host("publisher", || async {
        let stream = connect("proxy:5557").await?;
        let mut publisher = Publisher::new(stream, Participant::new(SimEnv::new()));
        for seq in 0u64.. {
            for topic in ["general", "other", "generalist"] {
                let Some(data) = json!({ "seq": seq }).as_object().cloned() else {
                    unreachable!()
                };
                publisher.publish(topic, "publish", data).await?;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    });

    sim.client("subscriber", async {
        let stream = connect("proxy:5558").await?;
        let participant = Participant::new(SimEnv::new());
        let mut subscriber = Subscriber::new(stream, participant.clone());
        subscriber.subscribe("general").await?;

        let mut topics = HashSet::new();
        for _ in 0..10 {
            let event = subscriber.next_event().await?.ok_or("proxy closed")?;
            assert!(event.topic.starts_with("general"), "unexpected topic {}", event.topic);
            assert!(participant.clock() > event.envelope.clock());
            topics.insert(event.topic);
        }

        assert!(topics.contains("general"));
        assert!(topics.contains("generalist"));
        Ok(())
    });

    sim.run().expect("simulation should complete");
}
