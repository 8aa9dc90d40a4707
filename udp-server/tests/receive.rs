use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use missive::{Relay, Shutdown, Submission, UdpRelay};
use udp_server::{LogStore, PersistenceServer};

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn keeps_running_after_bad_datagrams() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage").join("data.json");

    let server = PersistenceServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        LogStore::new(&path),
        1024,
    )
    .unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || server.run(&shutdown))
    };

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"definitely not json", addr).unwrap();
    sender.send_to(&[0xff; 2048], addr).unwrap();

    let relay = UdpRelay::new(addr);
    relay.relay(&Submission::new("alice", "hello")).unwrap();

    let reader = LogStore::new(&path);
    assert!(wait_for(|| !reader.load().is_empty()), "message never persisted");

    relay.relay(&Submission::new("bob", "hi")).unwrap();
    assert!(wait_for(|| reader.load().len() == 2), "second message never persisted");

    let records = reader.load();
    assert_eq!(records[0].submission, Submission::new("alice", "hello"));
    assert_eq!(records[1].submission, Submission::new("bob", "hi"));

    shutdown.trigger();
    handle.join().unwrap();

    // The socket is released once the loop returns.
    UdpSocket::bind(addr).unwrap();
}
