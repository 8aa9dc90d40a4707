//! Just enough HTTP/1.1 to read one request and write one response per connection.

use std::io::{self, Read, Write};

const HEADER_END: &[u8] = b"\r\n\r\n";
const MAX_HEAD_LEN: usize = 64 * 1024;
/// Form posts carry a username and a message; anything larger is refused.
const MAX_BODY_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// The request target without query string or fragment.
    pub fn path(&self) -> &str {
        self.target
            .split(&['?', '#'][..])
            .next()
            .unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}

/// Reads a single request off the stream.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything, and an `InvalidData` error when the head cannot be parsed.
pub fn read_request<R: Read>(stream: &mut R) -> io::Result<Option<Request>> {
    let mut request = vec![];

    let head_len = loop {
        if let Some(pos) = find_header_end(&request) {
            break pos;
        }
        if request.len() > MAX_HEAD_LEN {
            return Err(invalid("request head too large"));
        }

        let mut buf = vec![0u8; 1024];
        let read = stream.read(&mut buf)?;

        // EOF, or the client sent 0 bytes.
        if read == 0 {
            if request.is_empty() {
                return Ok(None);
            }
            return Err(invalid("connection closed mid-request"));
        }

        request.extend_from_slice(&buf[..read]);
    };

    let head = std::str::from_utf8(&request[..head_len])
        .map_err(|_| invalid("request head is not valid UTF-8"))?;
    let mut lines = head.split("\r\n");

    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let (method, target) = match (request_line.next(), request_line.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => return Err(invalid("malformed request line")),
    };

    let mut headers = vec![];
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid("malformed header line"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut parsed = Request {
        method,
        target,
        headers,
        body: vec![],
    };

    let content_length = match parsed.header("Content-Length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| invalid("invalid Content-Length"))?,
        None => 0,
    };
    if content_length > MAX_BODY_LEN {
        return Err(invalid("request body too large"));
    }

    let mut body = request.split_off(head_len + HEADER_END.len());
    if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        stream.read_exact(&mut body[already..])?;
    }
    body.truncate(content_length);
    parsed.body = body;

    Ok(Some(parsed))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: vec![],
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(302).with_header("Location", location)
    }

    /// The bare 404 used when a file backing a route is missing on disk.
    pub fn file_not_found() -> Self {
        Self::new(404).with_body(b"File not found".to_vec())
    }

    pub fn bad_request() -> Self {
        Self::new(400).with_body(b"Bad Request".to_vec())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        stream.write_all(
            format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status)).as_bytes(),
        )?;
        for (name, value) in &self.headers {
            stream.write_all(format!("{}: {}\r\n", name, value).as_bytes())?;
        }
        stream.write_all(format!("Content-Length: {}\r\n", self.body.len()).as_bytes())?;
        stream.write_all(b"Connection: close\r\n")?;
        stream.write_all(b"\r\n")?;
        stream.write_all(&self.body)?;

        Ok(())
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

#[cfg(test)]
fn parse(raw: &[u8]) -> io::Result<Option<Request>> {
    read_request(&mut io::Cursor::new(raw.to_vec()))
}

#[test]
fn test_read_get_request() {
    let req = parse(b"GET /message?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(req.method, "GET");
    assert_eq!(req.target, "/message?x=1");
    assert_eq!(req.path(), "/message");
    assert_eq!(req.header("host"), Some("localhost"));
    assert!(req.body.is_empty());
}

#[test]
fn test_read_post_body() {
    let req = parse(
        b"POST /submit HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nusername=alice&message=hello",
    )
    .unwrap()
    .unwrap();

    assert_eq!(req.method, "POST");
    // Bytes past Content-Length are dropped.
    assert_eq!(req.body, b"username=alice&message=hell");
}

#[test]
fn test_read_body_across_reads() {
    struct Chunked(Vec<Vec<u8>>);

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let chunk = self.0.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    let mut stream = Chunked(vec![
        b"POST /submit HTTP/1.1\r\nContent-Le".to_vec(),
        b"ngth: 10\r\n\r\nusern".to_vec(),
        b"ame=".to_vec(),
        b"x".to_vec(),
    ]);
    let req = read_request(&mut stream).unwrap().unwrap();

    assert_eq!(req.body, b"username=x");
}

#[test]
fn test_empty_connection() {
    assert_eq!(parse(b"").unwrap(), None);
}

#[test]
fn test_malformed_requests() {
    let err = parse(b"GARBAGE\r\n\r\n").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let err = parse(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let err = parse(b"GET / HTTP/1.1\r\nHost").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn test_oversized_body_is_refused() {
    let err = parse(b"POST /submit HTTP/1.1\r\nContent-Length: 1000000000000000\r\n\r\n").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let head = format!("POST /submit HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_LEN + 1);
    let err = parse(head.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let body = "x".repeat(MAX_BODY_LEN);
    let raw = format!("POST /submit HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", MAX_BODY_LEN, body);
    let req = parse(raw.as_bytes()).unwrap().unwrap();
    assert_eq!(req.body.len(), MAX_BODY_LEN);
}

#[test]
fn test_write_redirect() {
    let mut out = vec![];
    Response::redirect("/").write_to(&mut out).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "HTTP/1.1 302 Found\r\nLocation: /\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
}
