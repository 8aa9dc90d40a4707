use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use missive::config::Settings;
use missive::Shutdown;
use missived::Services;
use serde_json::{Map, Value};

fn post(addr: SocketAddr, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn read_log(path: &Path) -> Map<String, Value> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

fn wait_for_entries(path: &Path, count: usize) -> Map<String, Value> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let log = read_log(path);
        if log.len() >= count || Instant::now() > deadline {
            return log;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn submission_travels_from_form_to_log() {
    let public = tempfile::tempdir().unwrap();
    fs::write(public.path().join("error.html"), "<p>error</p>").unwrap();
    let storage = public.path().join("storage").join("data.json");

    let settings = Settings {
        http_addr: "127.0.0.1:0".parse().unwrap(),
        relay_addr: "127.0.0.1:0".parse().unwrap(),
        storage: storage.clone(),
        public_dir: public.path().to_path_buf(),
        ..Settings::default()
    };

    let services = Services::bind(&settings).unwrap();
    let http_addr = services.http_addr().unwrap();
    let relay_addr = services.relay_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || services.run(&shutdown))
    };

    // A stray datagram must not stop the persistence loop.
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .send_to(b"{\"username\": 7}", relay_addr)
        .unwrap();

    let response = post(http_addr, "username=alice&message=hello");
    assert!(response.starts_with("HTTP/1.1 302 Found\r\n"), "{}", response);
    assert!(response.contains("\r\nLocation: /\r\n"));

    let log = wait_for_entries(&storage, 1);
    assert_eq!(log.len(), 1);
    let (_, entry) = log.iter().next().unwrap();
    assert_eq!(entry["username"], "alice");
    assert_eq!(entry["message"], "hello");

    let response = post(http_addr, "username=&message=ignored");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.ends_with("<p>error</p>"));

    let response = post(http_addr, "username=bob&message=%D0%BF%D1%80%D0%B8%D0%B2%D1%96%D1%82");
    assert!(response.starts_with("HTTP/1.1 302 Found\r\n"));

    let log = wait_for_entries(&storage, 2);
    assert_eq!(log.len(), 2);
    let messages: Vec<_> = log.values().map(|v| v["message"].clone()).collect();
    assert_eq!(messages, vec![Value::from("hello"), Value::from("привіт")]);
    assert!(fs::read_to_string(&storage).unwrap().contains("привіт"));

    shutdown.trigger();
    handle.join().unwrap().unwrap();
}
