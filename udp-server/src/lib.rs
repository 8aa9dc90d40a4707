pub mod storage;

use std::io;
use std::net::{SocketAddr, UdpSocket};

use log::{debug, error, info, warn};
use missive::{LogRecord, Shutdown, Submission, WireError, POLL_INTERVAL};
use thiserror::Error;

pub use storage::{LogStore, StorageError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Decode(#[from] WireError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Receives submission datagrams and appends each one to the log.
pub struct PersistenceServer {
    socket: UdpSocket,
    store: LogStore,
    buffer_size: usize,
}

impl PersistenceServer {
    pub fn bind(addr: SocketAddr, store: LogStore, buffer_size: usize) -> io::Result<Self> {
        if buffer_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "datagram buffer size must be positive",
            ));
        }

        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        Ok(Self {
            socket,
            store,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Decodes one payload and appends it to the log.
    pub fn persist(&self, payload: &[u8]) -> Result<LogRecord, PersistError> {
        let submission = Submission::from_datagram(payload)?;
        Ok(self.store.append(&submission)?)
    }

    /// Receives until `shutdown` is triggered, then drops the socket.
    ///
    /// Bad payloads and storage failures are logged and skipped.
    pub fn run(self, shutdown: &Shutdown) {
        match self.local_addr() {
            Ok(addr) => info!("persistence server listening on {}", addr),
            Err(_) => info!("persistence server listening"),
        }

        let mut buf = vec![0u8; self.buffer_size];

        while !shutdown.is_triggered() {
            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    continue
                }
                Err(err) => {
                    warn!("receive failed: {}", err);
                    continue;
                }
            };

            if len == buf.len() {
                warn!(
                    "datagram from {} filled the {} byte buffer and may be truncated",
                    src, len
                );
            }

            match self.persist(&buf[..len]) {
                Ok(record) => debug!(
                    "stored message from {:?} at {}",
                    record.submission.username, record.timestamp
                ),
                Err(PersistError::Decode(err)) => {
                    warn!("skipping datagram from {}: {}", src, err)
                }
                Err(PersistError::Storage(err)) => error!("{}", err),
            }
        }

        info!("persistence server stopped");
    }
}

#[cfg(test)]
fn server_in(dir: &tempfile::TempDir) -> PersistenceServer {
    let store = LogStore::new(dir.path().join("data.json"));
    PersistenceServer::bind("127.0.0.1:0".parse().unwrap(), store, 1024).unwrap()
}

#[test]
fn test_persist_valid_payload() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_in(&dir);

    let record = server
        .persist(br#"{"username":"alice","message":"hello"}"#)
        .unwrap();

    assert_eq!(record.submission, Submission::new("alice", "hello"));
    assert_eq!(server.store().load(), vec![record]);
}

#[test]
fn test_persist_rejects_malformed_payload() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_in(&dir);

    let err = server.persist(b"{\"username\":").unwrap_err();

    assert!(matches!(err, PersistError::Decode(_)));
    assert!(!server.store().path().exists());
}

#[test]
fn test_zero_buffer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::new(dir.path().join("data.json"));

    let err = PersistenceServer::bind("127.0.0.1:0".parse().unwrap(), store, 0)
        .err()
        .unwrap();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}
