//! Round trip through a real NATS server.
//!
//! Run with a server listening on `NATS_TEST_URL` (default `nats://127.0.0.1:4222`):
//! `cargo test --test nats_live -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use runner_nats::{
    Dispatcher, Environment, NatsConnector, Registry, Resolver, RunnerSettings,
};

fn server_url() -> String {
    std::env::var("NATS_TEST_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "needs a running nats-server"]
async fn statuses_arrive_on_the_server_in_order() {
    let url = server_url();
    let client = async_nats::connect(url.as_str()).await.expect("connect");
    let mut sub = client
        .subscribe("pub.ansible.runner.live.>")
        .await
        .expect("subscribe");
    client.flush().await.expect("flush");

    let env = Environment::from_pairs([
        ("RUNNER_NATS_SUBJECT_ID", "live"),
        ("RUNNER_NATS_SERVERS", url.as_str()),
        ("RUNNER_NATS_HEADERS", "suite=live"),
    ]);
    let hooks = Dispatcher::new(Arc::new(Registry::new(
        Resolver::new(env),
        Arc::new(NatsConnector::new()),
    )));

    let registry = Arc::clone(hooks.registry());
    tokio::task::spawn_blocking(move || {
        let settings = RunnerSettings::default();
        for status in ["starting", "running", "successful"] {
            let payload = json!({"runner_ident": "live1", "status": status});
            hooks.on_status(&settings, payload.as_object().expect("object"));
        }
    })
    .await
    .expect("dispatch");

    let mut statuses = Vec::new();
    while statuses.len() < 3 {
        let msg = tokio::time::timeout(Duration::from_secs(10), sub.next())
            .await
            .expect("message in time")
            .expect("subscription open");
        assert_eq!(msg.subject.as_str(), "pub.ansible.runner.live.live1.status");
        let headers = msg.headers.expect("headers");
        assert_eq!(headers.get("suite").map(|v| v.as_str()), Some("live"));
        let body: serde_json::Value = serde_json::from_slice(&msg.payload).expect("json");
        statuses.push(body["status"].as_str().unwrap_or_default().to_string());
    }

    assert_eq!(statuses, ["starting", "running", "successful"]);
    assert!(registry.is_empty());
}
