pub mod http;
pub mod router;

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use missive::{Shutdown, POLL_INTERVAL};

pub use router::Router;

use http::Response;

/// Accepts HTTP connections and answers each on its own thread.
pub struct RequestServer {
    listener: TcpListener,
    router: Arc<Router>,
}

impl RequestServer {
    pub fn bind(addr: SocketAddr, router: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            router: Arc::new(router),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` is triggered, then drops the listener.
    pub fn run(self, shutdown: &Shutdown) {
        match self.local_addr() {
            Ok(addr) => info!("request server listening on {}", addr),
            Err(_) => info!("request server listening"),
        }

        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let router = Arc::clone(&self.router);
                    thread::spawn(move || {
                        if let Err(err) = handle_client(stream, &router) {
                            debug!("connection from {} failed: {}", peer, err);
                        }
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    warn!("accept failed: {}", err);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        info!("request server stopped");
    }
}

fn handle_client(mut stream: TcpStream, router: &Router) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;

    let response = match http::read_request(&mut stream) {
        Ok(Some(request)) => {
            let response = router.handle(&request);
            info!("{} {} {}", request.method, request.target, response.status);
            response
        }
        Ok(None) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            debug!("bad request: {}", err);
            Response::bad_request()
        }
        Err(err) => return Err(err),
    };

    response.write_to(&mut stream)?;
    stream.flush()
}
