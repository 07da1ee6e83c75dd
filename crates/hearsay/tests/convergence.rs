//! End-to-end convergence scenarios on loopback clusters.

use hearsay::{Peer, PeerConfig, PeerInfo};
use std::time::{Duration, Instant};

const PING_PERIOD: Duration = Duration::from_millis(25);
const CONVERGE: Duration = Duration::from_secs(10);
const LONG_CONVERGE: Duration = Duration::from_secs(30);

async fn spawn_peer() -> Peer {
    Peer::spawn(PeerConfig::new("127.0.0.1:0", PING_PERIOD))
        .await
        .expect("spawn peer")
}

/// Poll until `check` passes or `deadline` expires.
async fn wait_for(what: &str, deadline: Duration, mut check: impl FnMut() -> bool) {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_single_peer() {
    let peer0 = spawn_peer().await;

    let members = peer0.members();
    assert_eq!(members.len(), 1);
    assert!(members.contains_key(peer0.addr()));

    peer0.update_self_info(PeerInfo::named("peer0"));
    assert_eq!(peer0.members()[peer0.addr()].name, "peer0");

    // Seeding an address nobody listens on must leave the view untouched.
    let dead = spawn_peer().await;
    let dead_addr = dead.addr().to_string();
    dead.stop().await;

    peer0.add_seed(dead_addr);
    tokio::time::sleep(PING_PERIOD * 10).await;
    assert_eq!(peer0.members().len(), 1);

    peer0.stop().await;
    peer0.stop().await; // idempotent
}

#[tokio::test]
async fn test_dead_seed_is_never_added() {
    let peer0 = spawn_peer().await;
    let dead = spawn_peer().await;
    let dead_addr = dead.addr().to_string();
    dead.stop().await;

    peer0.add_seed(dead_addr.clone());
    tokio::time::sleep(PING_PERIOD * 10).await;
    assert!(!peer0.members().contains_key(&dead_addr));

    peer0.stop().await;
}

#[tokio::test]
async fn test_two_peers_converge() {
    let peer0 = spawn_peer().await;
    let peer1 = spawn_peer().await;

    peer0.add_seed(peer1.addr());
    wait_for("both peers see each other", CONVERGE, || {
        peer0.members().contains_key(peer1.addr()) && peer1.members().contains_key(peer0.addr())
    })
    .await;

    peer0.update_self_info(PeerInfo::named("peer0"));
    wait_for("peer1 learns peer0's name", CONVERGE, || {
        peer1
            .members()
            .get(peer0.addr())
            .is_some_and(|info| info.name == "peer0")
    })
    .await;

    peer1.update_self_info(PeerInfo::named("peer1"));
    wait_for("peer0 learns peer1's name", CONVERGE, || {
        peer0
            .members()
            .get(peer1.addr())
            .is_some_and(|info| info.name == "peer1")
    })
    .await;

    // A stopped peer is evicted once exchanges with it start failing.
    let peer1_addr = peer1.addr().to_string();
    peer1.stop().await;
    wait_for("peer0 evicts the stopped peer", LONG_CONVERGE, || {
        !peer0.members().contains_key(&peer1_addr)
    })
    .await;

    peer0.stop().await;
}

#[tokio::test]
async fn test_star_converges_and_survives_hub_loss() {
    let hub = spawn_peer().await;
    let hub_addr = hub.addr().to_string();

    let mut leaves = Vec::new();
    for i in 0..10 {
        let leaf = spawn_peer().await;
        leaf.update_self_info(PeerInfo::named(format!("leaf{i}")));
        leaf.add_seed(hub_addr.clone());
        leaves.push(leaf);
    }

    wait_for("full star convergence", LONG_CONVERGE, || {
        leaves.iter().all(|leaf| leaf.members().len() == 11)
    })
    .await;

    hub.stop().await;

    wait_for("leaves drop the hub, keep each other", LONG_CONVERGE, || {
        leaves.iter().all(|leaf| {
            let members = leaf.members();
            members.len() == 10 && !members.contains_key(&hub_addr)
        })
    })
    .await;

    // Advertised names survived the hub loss on every leaf.
    for leaf in &leaves {
        let members = leaf.members();
        for i in 0..10 {
            let name = format!("leaf{i}");
            assert!(
                members.values().any(|info| info.name == name),
                "missing {name} on {}",
                leaf.addr()
            );
        }
    }

    for leaf in leaves {
        leaf.stop().await;
    }
}

async fn spawn_group(size: usize, tag: &str) -> Vec<Peer> {
    let mut group: Vec<Peer> = Vec::new();
    for i in 0..size {
        let peer = spawn_peer().await;
        peer.update_self_info(PeerInfo::named(format!("{tag}{i}")));
        if let Some(first) = group.first() {
            peer.add_seed(first.addr());
        }
        group.push(peer);
    }
    group
}

#[tokio::test]
async fn test_partitioned_groups_merge() {
    let group_a = spawn_group(3, "a").await;
    let group_b = spawn_group(3, "b").await;

    wait_for("each group converges internally", LONG_CONVERGE, || {
        group_a.iter().all(|p| p.members().len() == 3)
            && group_b.iter().all(|p| p.members().len() == 3)
    })
    .await;

    // One link between the groups is enough to merge the views.
    group_a[0].add_seed(group_b[0].addr());

    wait_for("groups merge", LONG_CONVERGE, || {
        group_a
            .iter()
            .chain(group_b.iter())
            .all(|p| p.members().len() == 6)
    })
    .await;

    for peer in group_a.into_iter().chain(group_b) {
        peer.stop().await;
    }
}

#[tokio::test]
async fn test_repeated_identical_self_update() {
    let peer0 = spawn_peer().await;
    let peer1 = spawn_peer().await;

    peer0.add_seed(peer1.addr());
    peer0.update_self_info(PeerInfo::named("stable"));
    peer0.update_self_info(PeerInfo::named("stable"));

    wait_for("peer1 sees the payload", CONVERGE, || {
        peer1
            .members()
            .get(peer0.addr())
            .is_some_and(|info| info.name == "stable")
    })
    .await;

    // Another identical update bumps the version but changes nothing
    // observable once gossip quiesces.
    peer0.update_self_info(PeerInfo::named("stable"));
    tokio::time::sleep(PING_PERIOD * 10).await;
    assert_eq!(peer1.members()[peer0.addr()].name, "stable");

    peer0.stop().await;
    peer1.stop().await;
}
