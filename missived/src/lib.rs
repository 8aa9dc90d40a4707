use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use log::{info, warn};
use missive::config::Settings;
use missive::{Shutdown, UdpRelay};
use tcp_server::{RequestServer, Router};
use udp_server::{LogStore, PersistenceServer};

/// Both server loops, bound and ready to run.
pub struct Services {
    requests: RequestServer,
    persistence: PersistenceServer,
}

impl Services {
    /// Binds the persistence socket first so the relay can point at its real
    /// address, then the HTTP listener.
    pub fn bind(settings: &Settings) -> anyhow::Result<Self> {
        let store = LogStore::new(&settings.storage);
        let persistence =
            PersistenceServer::bind(settings.relay_addr, store, settings.datagram_buffer)
                .with_context(|| {
                    format!("bind persistence server on {}", settings.relay_addr)
                })?;

        let relay = UdpRelay::new(persistence.local_addr()?);
        let router = Router::new(&settings.public_dir, &settings.assets, relay);
        let requests = RequestServer::bind(settings.http_addr, router)
            .with_context(|| format!("bind request server on {}", settings.http_addr))?;

        Ok(Self {
            requests,
            persistence,
        })
    }

    pub fn http_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.requests.local_addr()?)
    }

    pub fn relay_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.persistence.local_addr()?)
    }

    /// Runs each loop on its own thread and returns once both have stopped.
    pub fn run(self, shutdown: &Shutdown) -> anyhow::Result<()> {
        let Self {
            requests,
            persistence,
        } = self;

        let persistence = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("persistence".into())
                .spawn(move || persistence.run(&shutdown))
                .context("spawn persistence thread")?
        };
        let spawned = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("requests".into())
                .spawn(move || requests.run(&shutdown))
        };
        let requests = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                stop_and_join(shutdown, persistence);
                return Err(err).context("spawn request thread");
            }
        };

        requests
            .join()
            .map_err(|_| anyhow!("request server thread panicked"))?;
        persistence
            .join()
            .map_err(|_| anyhow!("persistence server thread panicked"))?;

        info!("all servers stopped");
        Ok(())
    }
}

// Used when the second loop cannot start, so the first one does not outlive `run`.
fn stop_and_join(shutdown: &Shutdown, handle: JoinHandle<()>) {
    shutdown.trigger();
    if handle.join().is_err() {
        warn!("server thread panicked while stopping");
    }
}

#[test]
fn test_stop_and_join_releases_running_loop() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::new(dir.path().join("data.json"));
    let server = PersistenceServer::bind("127.0.0.1:0".parse().unwrap(), store, 1024).unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || server.run(&shutdown))
    };

    stop_and_join(&shutdown, handle);

    assert!(shutdown.is_triggered());
    // The loop has returned and closed its socket.
    std::net::UdpSocket::bind(addr).unwrap();
}
