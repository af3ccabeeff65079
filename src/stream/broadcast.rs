use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Error;

/// Written lines are abandoned after this long, the client is dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Client {
    peer: SocketAddr,
    stream: TcpStream,
}

/// Accepts any number of TCP clients and writes every message to all of them.
///
/// A client whose write fails is dropped. Nothing is read from clients.
#[derive(Debug)]
pub struct BroadcastService {
    local_addr: SocketAddr,
    clients: Arc<Mutex<Vec<Client>>>,
    running: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastService {
    /// Listen on every interface. Port 0 picks a free port, see [`Self::local_addr`].
    pub fn open(port: u16, accept_poll: Duration) -> Result<Self, Error> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(|source| Error::Listen { port, source })?;
        listener.set_nonblocking(true).map_err(|source| Error::Listen { port, source })?;
        let local_addr = listener.local_addr()?;

        let clients = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let acceptor = {
            let clients = Arc::clone(&clients);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("plg-broadcast-accept".into())
                .spawn(move || accept_loop(listener, clients, running, accept_poll))?
        };
        info!(%local_addr, "broadcast service listening");
        Ok(BroadcastService { local_addr, clients, running, acceptor: Mutex::new(Some(acceptor)) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Write the message to every client, returns how many received it
    pub fn send(&self, message: &str) -> usize {
        let mut clients = self.clients.lock();
        clients.retain_mut(|client| match deliver(&mut client.stream, message.as_bytes()) {
            Ok(()) => true,
            Err(error) => {
                warn!(peer = %client.peer, %error, "client disconnected");
                false
            }
        });
        clients.len()
    }

    /// Stop accepting and disconnect every client. Calling it again does nothing.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(acceptor) = self.acceptor.lock().take() {
            acceptor.thread().unpark();
            if acceptor.join().is_err() {
                warn!("broadcast accept thread panicked");
            }
        }
        for client in self.clients.lock().drain(..) {
            let _ = client.stream.shutdown(std::net::Shutdown::Both);
        }
        info!(local_addr = %self.local_addr, "broadcast service closed");
    }
}

impl Drop for BroadcastService {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes)?;
    stream.flush()
}

fn accept_loop(listener: TcpListener, clients: Arc<Mutex<Vec<Client>>>, running: Arc<AtomicBool>, poll: Duration) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => match prepare(&stream) {
                Ok(()) => {
                    debug!(%peer, "client connected");
                    clients.lock().push(Client { peer, stream });
                }
                Err(error) => warn!(%peer, %error, "cannot configure client connection"),
            },
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => thread::park_timeout(poll),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(%error, "accept failed");
                thread::park_timeout(poll);
            }
        }
    }
    // The listener is released here
}

fn prepare(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}
