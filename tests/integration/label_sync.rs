use std::time::Duration;

use lanlink_core::config::LanLinkConfig;
use lanlink_proto::SessionEvents;

use crate::{eventually, start_session};

fn labels_of(v: &[Option<String>]) -> Vec<Option<&str>> {
    v.iter().map(|l| l.as_deref()).collect()
}

/// Three peers join, announce labels, and every endpoint converges on
/// the same three-slot table.
#[tokio::test(start_paused = true)]
async fn three_peers_converge_on_one_label_table() {
    let config = LanLinkConfig::default();
    let session = start_session(&config);

    let (peer_a, _) = session.join_peer(1, "Alice", &config);
    let (peer_b, _) = session.join_peer(2, "Bob", &config);
    let (peer_c, _) = session.join_peer(3, "Cara", &config);

    let expected = vec![Some("Host"), Some("Alice"), Some("Bob"), Some("Cara")];
    eventually(Duration::from_secs(120), || {
        labels_of(&session.authority.labels()) == expected
    })
    .await;

    for peer in [&peer_a, &peer_b, &peer_c] {
        let rx = peer.labels();
        eventually(Duration::from_secs(120), || {
            labels_of(&rx.borrow()) == expected
        })
        .await;
    }
}

/// A departing peer's slot goes vacant and the survivors hear about it.
#[tokio::test(start_paused = true)]
async fn departure_is_broadcast_to_survivors() {
    let config = LanLinkConfig::default();
    let session = start_session(&config);

    let (peer_a, _) = session.join_peer(1, "Alice", &config);
    let (peer_b, _) = session.join_peer(2, "Bob", &config);

    eventually(Duration::from_secs(120), || {
        labels_of(&session.authority.labels()) == vec![Some("Host"), Some("Alice"), Some("Bob")]
    })
    .await;

    session.authority.on_peer_left(1);
    session.hub.detach(1);
    peer_a.shutdown().await;

    let rx = peer_b.labels();
    eventually(Duration::from_secs(120), || {
        labels_of(&rx.borrow()) == vec![Some("Host"), None, Some("Bob")]
    })
    .await;
}

/// A peer that joins the roster but never attaches cannot ack, so the
/// broadcast times out and the operator is warned; the responsive peer
/// still receives the table.
#[tokio::test(start_paused = true)]
async fn unreachable_peer_triggers_partial_sync_warning() {
    let config = LanLinkConfig::default();
    let session = start_session(&config);

    let (peer_a, _) = session.join_peer(1, "Alice", &config);
    // Peer 2 exists for the roster only.
    session.authority.on_peer_joined(2);

    let rx = peer_a.labels();
    eventually(Duration::from_secs(120), || {
        let table = rx.borrow();
        let labels = labels_of(&table);
        labels.len() == 3 && labels[1] == Some("Alice")
    })
    .await;

    eventually(Duration::from_secs(120), || !session.sink.warnings().is_empty()).await;
    assert!(session.sink.warnings()[0].contains("peers"));
}

/// Label sync can be switched off entirely; peers then never learn any
/// labels.
#[tokio::test(start_paused = true)]
async fn disabled_label_sync_stays_silent() {
    let mut config = LanLinkConfig::default();
    config.label_sync.enabled = false;
    let session = start_session(&config);

    let (peer_a, _) = session.join_peer(1, "Alice", &config);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(peer_a.labels().borrow().is_empty());
    assert!(session.sink.warnings().is_empty());
}
