use std::sync::Arc;
use std::time::Duration;

use lanlink_core::config::LanLinkConfig;
use lanlink_proto::channel::{LoopbackHub, MemorySink};
use lanlink_proto::runtime::spawn_peer;
use lanlink_proto::AUTHORITY;

use crate::{eventually, init_tracing, start_session};

/// Every peer measures against the live authority and gets samples on
/// its own sink.
#[tokio::test(start_paused = true)]
async fn each_peer_gets_latency_samples() {
    let config = LanLinkConfig::default();
    let session = start_session(&config);

    let (_peer_a, sink_a) = session.join_peer(1, "Alice", &config);
    let (_peer_b, sink_b) = session.join_peer(2, "Bob", &config);

    eventually(Duration::from_secs(60), || {
        !sink_a.samples().is_empty() && !sink_b.samples().is_empty()
    })
    .await;

    // Loopback round trips are effectively instant.
    assert!(sink_a.last_sample().unwrap() < 100);
}

/// With no authority attached the first probe cycle times out and the
/// peer falls back to the transport's RTT metric for good.
#[tokio::test(start_paused = true)]
async fn silent_authority_forces_transport_fallback() {
    init_tracing();
    let hub = LoopbackHub::new();
    hub.set_transport_rtt(AUTHORITY, 80);

    let config = LanLinkConfig::default();
    let (channel, inbound) = hub.attach(1);
    let sink = MemorySink::new();
    let _peer = spawn_peer(Arc::new(channel), sink.clone(), &config, inbound, "Alice");

    eventually(Duration::from_secs(60), || sink.last_sample() == Some(80)).await;
}

/// Disabling the latency module suppresses probing entirely.
#[tokio::test(start_paused = true)]
async fn disabled_latency_module_never_samples() {
    let mut config = LanLinkConfig::default();
    config.latency.enabled = false;
    let session = start_session(&config);

    let (_peer_a, sink_a) = session.join_peer(1, "Alice", &config);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sink_a.samples().is_empty());
}

/// One-way mode halves the fallback metric as well.
#[tokio::test(start_paused = true)]
async fn one_way_mode_halves_the_transport_metric() {
    init_tracing();
    let hub = LoopbackHub::new();
    hub.set_transport_rtt(AUTHORITY, 90);

    let mut config = LanLinkConfig::default();
    config.latency.custom_probe = false;
    config.latency.rtt_measurement = false;
    let (channel, inbound) = hub.attach(1);
    let sink = MemorySink::new();
    let _peer = spawn_peer(Arc::new(channel), sink.clone(), &config, inbound, "Alice");

    eventually(Duration::from_secs(60), || sink.last_sample() == Some(45)).await;
}
