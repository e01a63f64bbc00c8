//! Exercises the register round trip and cross-seed PL convergence
//! (testable properties: invariant 2, and the register-then-query
//! round-trip) against three real seed processes talking over loopback
//! TCP, not mocked dispatch.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;

use overlay_core::identity::NodeId;
use overlay_core::logfile::EventLog;
use overlay_core::wire::{
    read_message, write_message, Message, PlRequest, RegisterRequest,
};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn spawn_seed_cluster(n: usize) -> (Vec<NodeId>, watch::Sender<bool>) {
    let seeds: Vec<NodeId> = (0..n).map(|_| NodeId::new("127.0.0.1", free_port())).collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    for seed in &seeds {
        let self_id = seed.clone();
        let all_seeds = seeds.clone();
        let rx = shutdown_rx.clone();
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), overlay_core::identity::NodeKind::Seed, self_id.port)
            .unwrap();
        let status_notify = std::sync::Arc::new(tokio::sync::Notify::new());
        tokio::spawn(async move {
            let _ = overlay_core::seed::run(self_id, all_seeds, log, rx, status_notify).await;
            drop(dir);
        });
    }

    // Give the mesh time to dial itself together before any client connects.
    tokio::time::sleep(Duration::from_millis(200)).await;
    (seeds, shutdown_tx)
}

#[tokio::test]
async fn register_commit_is_visible_from_every_seed() {
    let (seeds, _shutdown) = spawn_seed_cluster(3).await;
    let candidate = NodeId::new("127.0.0.1", free_port());

    let mut conn = TcpStream::connect(seeds[0].socket_addr_string()).await.unwrap();
    write_message(
        &mut conn,
        &Message::RegisterRequest(RegisterRequest {
            peer_id: candidate.clone(),
        }),
    )
    .await
    .unwrap();

    let ack = tokio::time::timeout(Duration::from_secs(2), read_message(&mut conn))
        .await
        .expect("register ack timed out")
        .unwrap()
        .unwrap();
    let acked_pl = match ack {
        Message::RegisterAck(a) => a.pl,
        other => panic!("expected RegisterAck, got {other:?}"),
    };
    assert!(acked_pl.contains(&candidate));

    // Quorum only requires a majority, so give the remaining seed(s) a
    // moment to receive the broadcast commit before querying them.
    tokio::time::sleep(Duration::from_millis(100)).await;

    for seed in &seeds[1..] {
        let mut other = TcpStream::connect(seed.socket_addr_string()).await.unwrap();
        write_message(&mut other, &Message::PlRequest(PlRequest {})).await.unwrap();
        let resp = tokio::time::timeout(Duration::from_secs(2), read_message(&mut other))
            .await
            .expect("pl response timed out")
            .unwrap()
            .unwrap();
        match resp {
            Message::PlResponse(r) => assert!(
                r.pl.contains(&candidate),
                "seed {seed} does not yet see {candidate} in its PL"
            ),
            other => panic!("expected PlResponse, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn a_single_seed_registers_itself_as_a_trivial_quorum() {
    let (seeds, _shutdown) = spawn_seed_cluster(1).await;
    let candidate = NodeId::new("127.0.0.1", free_port());

    let mut conn = TcpStream::connect(seeds[0].socket_addr_string()).await.unwrap();
    write_message(
        &mut conn,
        &Message::RegisterRequest(RegisterRequest {
            peer_id: candidate.clone(),
        }),
    )
    .await
    .unwrap();

    let ack = tokio::time::timeout(Duration::from_secs(2), read_message(&mut conn))
        .await
        .expect("register ack timed out")
        .unwrap()
        .unwrap();
    match ack {
        Message::RegisterAck(a) => assert!(a.pl.contains(&candidate)),
        other => panic!("expected RegisterAck, got {other:?}"),
    }
}
