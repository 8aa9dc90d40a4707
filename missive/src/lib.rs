#[macro_use]
extern crate serde_derive;

pub mod config;

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// How often the blocking loops wake up to look at the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A username/message pair as submitted through the form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Submission {
    pub username: String,
    pub message: String,
}

impl Submission {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Both fields must be non-empty for the form to accept the submission.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.message.is_empty()
    }

    /// Encodes the submission as a single JSON datagram payload.
    pub fn to_datagram(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decodes a datagram payload. Unknown fields are ignored, missing ones are not.
    pub fn from_datagram(payload: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(payload).map_err(WireError::Decode)
    }
}

/// A submission together with the timestamp it was persisted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub submission: Submission,
}

impl LogRecord {
    pub fn new(timestamp: impl Into<String>, submission: Submission) -> Self {
        Self {
            timestamp: timestamp.into(),
            submission,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode submission: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed submission payload: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("failed to send datagram to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// One-way hand-off of a submission to the persistence side.
///
/// Delivery is best effort: an `Ok` only means the payload left this process,
/// never that it was stored.
pub trait Relay: Send + Sync {
    fn relay(&self, submission: &Submission) -> Result<(), RelayError>;
}

impl<R: Relay + ?Sized> Relay for Arc<R> {
    fn relay(&self, submission: &Submission) -> Result<(), RelayError> {
        (**self).relay(submission)
    }
}

/// Sends each submission as one datagram from a throwaway socket.
#[derive(Debug, Clone)]
pub struct UdpRelay {
    target: SocketAddr,
}

impl UdpRelay {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Relay for UdpRelay {
    fn relay(&self, submission: &Submission) -> Result<(), RelayError> {
        let payload = submission.to_datagram()?;
        let local = if self.target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let send_err = |source| RelayError::Send {
            target: self.target,
            source,
        };

        let socket = UdpSocket::bind(local).map_err(send_err)?;
        socket.send_to(&payload, self.target).map_err(send_err)?;
        Ok(())
    }
}

/// Process-wide stop flag shared by the server loops.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that flips on Ctrl-C or SIGTERM.
    pub fn on_interrupt() -> Result<Self, ctrlc::Error> {
        let shutdown = Self::new();
        let handle = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, shutting down");
            handle.trigger();
        })?;
        Ok(shutdown)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Installs the `env_logger` backend, defaulting to `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[test]
fn test_datagram_shape() {
    let val = Submission::new("alice", "hello");
    let buf = val.to_datagram().unwrap();

    assert_eq!(buf, br#"{"username":"alice","message":"hello"}"#);
    assert_eq!(Submission::from_datagram(&buf).unwrap(), val);
}

#[test]
fn test_datagram_ignores_extra_fields() {
    let payload = br#"{"message":"hi","username":"bob","mood":"fine"}"#;
    let val = Submission::from_datagram(payload).unwrap();

    assert_eq!(val, Submission::new("bob", "hi"));
}

#[test]
fn test_datagram_rejects_garbage() {
    assert!(Submission::from_datagram(b"not json").is_err());
    assert!(Submission::from_datagram(br#"{"username":"bob"}"#).is_err());
    assert!(Submission::from_datagram(br#"{"username":1,"message":"x"}"#).is_err());
    // truncated payload
    assert!(Submission::from_datagram(br#"{"username":"bob","mess"#).is_err());
}

#[test]
fn test_is_complete() {
    assert!(Submission::new("a", "b").is_complete());
    assert!(!Submission::new("", "b").is_complete());
    assert!(!Submission::new("a", "").is_complete());
}

#[test]
fn test_shutdown_is_shared_between_clones() {
    let shutdown = Shutdown::new();
    let other = shutdown.clone();
    assert!(!other.is_triggered());

    shutdown.trigger();
    assert!(other.is_triggered());
}

#[test]
fn test_udp_relay_sends_one_datagram() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let relay = UdpRelay::new(receiver.local_addr().unwrap());

    relay.relay(&Submission::new("алиса", "привіт")).unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    let received = Submission::from_datagram(&buf[..len]).unwrap();
    assert_eq!(received, Submission::new("алиса", "привіт"));
}
