//! End-to-end tests driving real participants over loopback UDP. Each test
//! uses its own port range so they can run in parallel, and each logical
//! client request uses a fresh socket so replies cannot cross between
//! requests.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

fn group(base: u16, count: usize) -> Vec<SocketAddr> {
    (0..count)
        .map(|k| SocketAddr::from(([127, 0, 0, 1], base + k as u16)))
        .collect()
}

fn spawn(
    id: usize,
    count: usize,
    base: u16,
    log_dir: &std::path::Path,
) -> JoinHandle<std::io::Result<()>> {
    let config = upaxos::Config::new(id, count)
        .with_group(group(base, count))
        .with_log_dir(log_dir)
        .with_tick(Duration::from_millis(100));
    tokio::spawn(config.run())
}

/// Send `payload` to `to`, resending until a reply arrives. Returns `None`
/// once the attempts are exhausted, which some tests rely on.
async fn request(to: SocketAddr, payload: &str, attempts: usize) -> Option<String> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buffer = [0u8; upaxos::MAX_PAYLOAD];
    for _ in 0..attempts {
        socket.send_to(payload.as_bytes(), to).await.unwrap();
        let received = tokio::time::timeout(
            Duration::from_millis(250),
            socket.recv_from(&mut buffer),
        );
        if let Ok(Ok((length, _))) = received.await {
            return Some(String::from_utf8_lossy(&buffer[..length]).into_owned())
        }
    }
    None
}

async fn shutdown(addresses: &[SocketAddr]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for address in addresses {
        socket.send_to(b"quit", *address).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_participant_commits_immediately() {
    let directory = tempfile::tempdir().unwrap();
    let group = group(47200, 1);
    let handle = spawn(0, 1, 47200, directory.path());

    let reply = request(group[0], "Request 1 hello", 20).await;
    assert_eq!(reply.as_deref(), Some("0 OK 1 hello"));

    // A committed write is visible to any later read of the instance.
    let reply = request(group[0], "Request 1", 20).await;
    assert_eq!(reply.as_deref(), Some("0 OK 1 hello"));

    shutdown(&group).await;
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test(flavor = "multi_thread")]
async fn three_participants_agree() {
    let directory = tempfile::tempdir().unwrap();
    let group = group(47300, 3);
    let handles = (0..3)
        .map(|id| spawn(id, 3, 47300, directory.path()))
        .collect::<Vec<_>>();

    let reply = request(group[0], "Request 1 hello", 40).await;
    assert_eq!(reply.as_deref(), Some("0 OK 1 hello"));

    // Every participant's learner saw the Accept quorum, so a read served
    // by any of them reports the same value.
    for (id, address) in group.iter().enumerate() {
        let reply = request(*address, "Request 1", 40).await;
        assert_eq!(reply, Some(format!("{} OK 1 hello", id)));
    }

    shutdown(&group).await;
    for handle in handles {
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn reads_of_undecided_instances_go_unanswered() {
    let directory = tempfile::tempdir().unwrap();
    let group = group(47400, 1);
    let handle = spawn(0, 1, 47400, directory.path());

    let reply = request(group[0], "Request 99", 4).await;
    assert_eq!(reply, None);

    shutdown(&group).await;
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test(flavor = "multi_thread")]
async fn overflowing_the_backlog_earns_busy() {
    let directory = tempfile::tempdir().unwrap();
    let group = group(47600, 3);
    // Only participant 0 runs: with no promise quorum available its leader
    // can never commit, so writes pile up behind the one in flight.
    let handle = spawn(0, 3, 47600, directory.path());

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for k in 0..11 {
        let payload = format!("Request 1 fill-{}", k);
        socket.send_to(payload.as_bytes(), group[0]).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // One in flight plus ten queued: the next write is turned away.
    let reply = request(group[0], "Request 1 overflow", 4).await;
    assert_eq!(reply.as_deref(), Some("BUSY"));

    shutdown(&group).await;
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_replays_the_recovery_log() {
    let directory = tempfile::tempdir().unwrap();
    let group = group(47500, 1);

    let handle = spawn(0, 1, 47500, directory.path());
    let reply = request(group[0], "Request 1 persisted", 20).await;
    assert_eq!(reply.as_deref(), Some("0 OK 1 persisted"));
    shutdown(&group).await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // Same log directory, fresh process state: the decision must survive.
    let handle = spawn(0, 1, 47500, directory.path());
    let reply = request(group[0], "Request 1", 20).await;
    assert_eq!(reply.as_deref(), Some("0 OK 1 persisted"));

    shutdown(&group).await;
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test(flavor = "multi_thread")]
async fn misconfigured_identifier_fails_fast() {
    let directory = tempfile::tempdir().unwrap();
    let config = upaxos::Config::new(5, 3).with_log_dir(directory.path());
    assert!(config.run().await.is_err());
}
