use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use missive::{Shutdown, Submission, UdpRelay};
use tcp_server::{RequestServer, Router};

fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn serves_form_and_relays_submission() {
    let public = tempfile::tempdir().unwrap();
    fs::write(public.path().join("index.html"), "<h1>index</h1>").unwrap();
    fs::write(public.path().join("error.html"), "<h1>oops</h1>").unwrap();

    let persistence = UdpSocket::bind("127.0.0.1:0").unwrap();
    persistence
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let relay = UdpRelay::new(persistence.local_addr().unwrap());

    let router = Router::new(public.path(), &["style.css".to_string()], relay);
    let server = RequestServer::bind("127.0.0.1:0".parse().unwrap(), router).unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || server.run(&shutdown))
    };

    let index = roundtrip(addr, "GET / HTTP/1.1\r\nHost: test\r\n\r\n");
    assert!(index.starts_with("HTTP/1.1 200 OK\r\n"), "{}", index);
    assert!(index.ends_with("\r\n\r\n<h1>index</h1>"), "{}", index);

    let missing = roundtrip(addr, "GET /style.css HTTP/1.1\r\n\r\n");
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(missing.ends_with("File not found"));

    let unknown = roundtrip(addr, "GET /elsewhere HTTP/1.1\r\n\r\n");
    assert!(unknown.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(unknown.ends_with("<h1>oops</h1>"));

    let body = "username=alice&message=hello";
    let submit = roundtrip(
        addr,
        &format!(
            "POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert!(submit.starts_with("HTTP/1.1 302 Found\r\n"), "{}", submit);
    assert!(submit.contains("\r\nLocation: /\r\n"));

    let mut buf = [0u8; 1024];
    let (len, _) = persistence.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], br#"{"username":"alice","message":"hello"}"#);
    assert_eq!(
        Submission::from_datagram(&buf[..len]).unwrap(),
        Submission::new("alice", "hello")
    );

    let rejected = roundtrip(
        addr,
        "POST /submit HTTP/1.1\r\nContent-Length: 17\r\n\r\nusername=&message",
    );
    assert!(rejected.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(rejected.ends_with("<h1>oops</h1>"));

    let garbage = roundtrip(addr, "nonsense\r\n\r\n");
    assert!(garbage.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    let oversized = roundtrip(
        addr,
        "POST /submit HTTP/1.1\r\nContent-Length: 1000000000000000\r\n\r\n",
    );
    assert!(oversized.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    // Still serving after the refused request.
    let index = roundtrip(addr, "GET / HTTP/1.1\r\n\r\n");
    assert!(index.starts_with("HTTP/1.1 200 OK\r\n"));

    shutdown.trigger();
    handle.join().unwrap();
}
