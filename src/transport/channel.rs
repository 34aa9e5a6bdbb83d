//! Point-to-point data channels
//!
//! A push side sends `Data` frames and closes with a terminator that each
//! consumer acknowledges. A pull side hands frames to its owner through a
//! local queue, so waiting on it is cancel safe.
//!
//! ```text
//!  PushListener::bind ─ accept_peers(n) ──► PushChannel ──┐ round-robin
//!                                                         ├──► PullChannel::connect (×n)
//!  PushChannel::connect (×n) ──► PullListener::bind ─ accept(n) ──► PullChannel (fan-in)
//! ```

use super::frame::{read_frame, write_frame, Frame};
use super::{Endpoint, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Frames queued per pull channel before readers stop reading the socket
const PULL_QUEUE_CAPACITY: usize = 1024;

const WRITE_BUFFER: usize = 64 * 1024;

/// What a pull channel hands to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Data(T),
    /// One sender finished
    Terminator,
}

// ============================================================================
// Connections
// ============================================================================

pub(crate) struct Connection {
    pub endpoint: Endpoint,
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: BufWriter<OwnedWriteHalf>,
}

impl Connection {
    fn new(endpoint: Endpoint, stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", endpoint, e);
        }
        let (read, write) = stream.into_split();
        Self {
            endpoint,
            reader: BufReader::new(read),
            writer: BufWriter::with_capacity(WRITE_BUFFER, write),
        }
    }

    async fn send<T: Serialize>(&mut self, frame: &Frame<T>) -> Result<(), TransportError> {
        write_frame(&mut self.writer, frame).await
    }

    async fn send_now<T: Serialize>(&mut self, frame: &Frame<T>) -> Result<(), TransportError> {
        self.send(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn expect(&mut self, wanted: Frame<()>) -> Result<(), TransportError> {
        match read_frame::<_, ()>(&mut self.reader).await? {
            Some(frame) if frame == wanted => Ok(()),
            Some(frame) => Err(TransportError::Protocol(format!(
                "expected {:?} from {}, got {:?}",
                wanted, self.endpoint, frame
            ))),
            None => Err(TransportError::Closed(self.endpoint.clone())),
        }
    }
}

/// Connect to a binder, retrying until it listens, then say hello
pub(crate) async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Connection, TransportError> {
    let deadline = Instant::now() + connect_timeout;
    let mut backoff = Duration::from_millis(20);
    let stream = loop {
        match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
            Ok(stream) => break stream,
            Err(e) if Instant::now() + backoff < deadline => {
                debug!("Connect to {} failed ({}), retrying in {:?}", endpoint, e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    endpoint: endpoint.clone(),
                    timeout: connect_timeout,
                })
            }
        }
    };

    let mut connection = Connection::new(endpoint.clone(), stream);
    connection.send_now(&Frame::<()>::Hello).await?;
    let remaining = deadline.saturating_duration_since(Instant::now()).max(Duration::from_secs(1));
    timeout(remaining, connection.expect(Frame::Welcome))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            endpoint: endpoint.clone(),
            timeout: connect_timeout,
        })??;
    debug!("Connected to {}", endpoint);
    Ok(connection)
}

/// Listening side of a channel
pub(crate) struct Binder {
    endpoint: Endpoint,
    listener: TcpListener,
}

impl Binder {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        debug!("Listening on {}", endpoint);
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accept exactly `expected` connectors, welcoming each after its hello
    pub async fn accept(&self, expected: usize, ready_timeout: Duration) -> Result<Vec<Connection>, TransportError> {
        let mut ready = Vec::with_capacity(expected);
        let accept_all = async {
            while ready.len() < expected {
                let (stream, addr) = self.listener.accept().await?;
                let mut connection = Connection::new(self.endpoint.clone(), stream);
                match connection.expect(Frame::Hello).await {
                    Ok(()) => {
                        connection.send_now(&Frame::<()>::Welcome).await?;
                        debug!("{}: peer {} ready ({}/{})", self.endpoint, addr, ready.len() + 1, expected);
                        ready.push(connection);
                    }
                    Err(e) => warn!("{}: dropping peer {}: {}", self.endpoint, addr, e),
                }
            }
            Ok::<(), TransportError>(())
        };

        let outcome = timeout(ready_timeout, accept_all).await;
        match outcome {
            Ok(result) => result.map(|()| ready),
            Err(_) => Err(TransportError::ReadyTimeout {
                endpoint: self.endpoint.clone(),
                expected,
                ready: ready.len(),
            }),
        }
    }
}

// ============================================================================
// Push side
// ============================================================================

/// Sender distributing `Data` frames round-robin across its consumers
pub struct PushChannel<T> {
    peers: Vec<Connection>,
    next: usize,
    sent: u64,
    _marker: PhantomData<fn(T)>,
}

/// Bound push endpoint waiting for its pullers
pub struct PushListener<T> {
    binder: Binder,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize> PushListener<T> {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        Ok(Self {
            binder: Binder::bind(endpoint).await?,
            _marker: PhantomData,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.binder.endpoint()
    }

    /// Wait until `expected` pullers completed the handshake
    pub async fn accept_peers(self, expected: usize, ready_timeout: Duration) -> Result<PushChannel<T>, TransportError> {
        let peers = self.binder.accept(expected, ready_timeout).await?;
        Ok(PushChannel::from_peers(peers))
    }
}

impl<T: Serialize> PushChannel<T> {
    fn from_peers(peers: Vec<Connection>) -> Self {
        Self {
            peers,
            next: 0,
            sent: 0,
            _marker: PhantomData,
        }
    }

    /// Push to a single binding puller
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::from_peers(vec![connect(endpoint, connect_timeout).await?]))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Send one item to the next consumer in turn
    pub async fn send(&mut self, item: T) -> Result<(), TransportError> {
        if self.peers.is_empty() {
            return Err(TransportError::NoPeers);
        }
        let peer = &mut self.peers[self.next];
        peer.send(&Frame::Data(item)).await?;
        self.next = (self.next + 1) % self.peers.len();
        self.sent += 1;
        Ok(())
    }

    /// Send a terminator to every consumer and wait for all acknowledgements
    pub async fn finish(mut self, ack_timeout: Duration) -> Result<u64, TransportError> {
        for peer in &mut self.peers {
            peer.send_now(&Frame::<T>::Terminator).await?;
        }
        for peer in &mut self.peers {
            let endpoint = peer.endpoint.clone();
            timeout(ack_timeout, peer.expect(Frame::Ack))
                .await
                .map_err(|_| TransportError::AckTimeout(endpoint))??;
        }
        debug!("Push channel finished after {} items to {} peers", self.sent, self.peers.len());
        Ok(self.sent)
    }
}

// ============================================================================
// Pull side
// ============================================================================

/// Receiver fed by one or more pushers.
///
/// Each connection has a reader task that stops after acknowledging its
/// terminator, at end of stream, or at its next frame once the channel
/// is dropped.
pub struct PullChannel<T> {
    rx: mpsc::Receiver<Delivery<T>>,
}

/// Bound pull endpoint waiting for its pushers
pub struct PullListener<T> {
    binder: Binder,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PullListener<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        Ok(Self {
            binder: Binder::bind(endpoint).await?,
            _marker: PhantomData,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.binder.endpoint()
    }

    /// Wait until `expected` pushers completed the handshake; their frames
    /// are merged into one queue
    pub async fn accept(self, expected: usize, ready_timeout: Duration) -> Result<PullChannel<T>, TransportError> {
        let peers = self.binder.accept(expected, ready_timeout).await?;
        Ok(PullChannel::from_peers(peers))
    }
}

impl<T> PullChannel<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn from_peers(peers: Vec<Connection>) -> Self {
        let (tx, rx) = mpsc::channel(PULL_QUEUE_CAPACITY);
        for peer in peers {
            tokio::spawn(pull_frames(peer, tx.clone()));
        }
        Self { rx }
    }

    /// Pull from a single binding pusher
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::from_peers(vec![connect(endpoint, connect_timeout).await?]))
    }

    /// Next delivery; `None` once every sender disconnected. Cancel safe.
    pub async fn recv(&mut self) -> Option<Delivery<T>> {
        self.rx.recv().await
    }
}

/// Forward frames of one connection into the shared queue. The terminator
/// is queued before the acknowledgement goes out.
async fn pull_frames<T: DeserializeOwned>(mut peer: Connection, tx: mpsc::Sender<Delivery<T>>) {
    loop {
        let frame = match read_frame::<_, T>(&mut peer.reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("{}: read failed: {}", peer.endpoint, e);
                break;
            }
        };
        match frame {
            Frame::Data(item) => {
                if tx.send(Delivery::Data(item)).await.is_err() {
                    break;
                }
            }
            Frame::Terminator => {
                if tx.send(Delivery::Terminator).await.is_err() {
                    break;
                }
                if let Err(e) = peer.send_now(&Frame::<()>::Ack).await {
                    warn!("{}: could not acknowledge terminator: {}", peer.endpoint, e);
                }
                break;
            }
            other => warn!("{}: ignoring unexpected {} frame", peer.endpoint, frame_name(&other)),
        }
    }
}

fn frame_name<T>(frame: &Frame<T>) -> &'static str {
    match frame {
        Frame::Hello => "hello",
        Frame::Welcome => "welcome",
        Frame::Data(_) => "data",
        Frame::Terminator => "terminator",
        Frame::Ack => "ack",
        Frame::Stop => "stop",
    }
}

// ============================================================================
// Fan-in accounting
// ============================================================================

/// Counts terminators from the `expected` senders of a fan-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanIn {
    expected: usize,
    remaining: usize,
}

impl FanIn {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            remaining: expected,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Record one terminator; returns true when the intake is drained
    pub fn terminator(&mut self) -> bool {
        if self.remaining == 0 {
            warn!("Ignoring terminator beyond the {} expected", self.expected);
        } else {
            self.remaining -= 1;
        }
        self.is_drained()
    }

    pub fn is_drained(&self) -> bool {
        self.remaining == 0
    }
}
