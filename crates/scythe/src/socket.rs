//! Controller end of the socket transport.
//!
//! The controller listens and the host dials in. Architecture follows the
//! reactor pattern:
//! - the listener and the accepted connection are owned by one reactor task
//! - callers submit encoded requests through an mpsc channel
//! - replies go back through a oneshot per request
//!
//! Responses carry no request id, so the reactor matches them to callers in
//! the order the requests were written. A caller that timed out has dropped
//! its receiver; its slot stays in the queue and the late reply is thrown
//! away when it arrives, which keeps later replies aligned.

use async_trait::async_trait;
use scytheconf::SocketConfig;
use scytheproto::{encode_line, DecodeMode, LineFramer, Request, Response};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, trace, warn};

use crate::bridge::{Bridge, TransportKind};
use crate::error::BridgeError;

const READ_BUF_LEN: usize = 8 * 1024;

/// Pause after a failed accept so a persistent error cannot spin the reactor.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type Reply = oneshot::Sender<Result<Response, BridgeError>>;

/// Command sent to the reactor task
enum ReactorCommand {
    /// Write one encoded line and queue the caller for the next reply
    Request { line: Vec<u8>, response_tx: Reply },
    /// Fail everything pending and stop listening
    Shutdown,
}

/// What woke the reactor up.
enum Event {
    Command(Option<ReactorCommand>),
    Accepted(io::Result<(tokio::net::TcpStream, SocketAddr)>),
    Read(io::Result<usize>),
}

struct HostConnection {
    peer: SocketAddr,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

/// Listener plus reactor. Cheap to share behind an `Arc`.
pub struct SocketBridge {
    local_addr: SocketAddr,
    request_timeout: Duration,
    cmd_tx: mpsc::Sender<ReactorCommand>,
    connected: watch::Receiver<bool>,
}

impl SocketBridge {
    /// Bind the listener and spawn the reactor. Must be called inside a
    /// tokio runtime.
    pub async fn bind(config: &SocketConfig) -> Result<Self, BridgeError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| BridgeError::io(&address, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::io(&address, e))?;

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (connected_tx, connected) = watch::channel(false);
        tokio::spawn(reactor_task(listener, cmd_rx, connected_tx));

        info!(%local_addr, "listening for host");
        Ok(Self {
            local_addr,
            request_timeout: config.request_timeout(),
            cmd_tx,
            connected,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until a host connection is up, or give up after `limit`.
    pub async fn wait_for_host(&self, limit: Duration) -> Result<(), BridgeError> {
        let mut connected = self.connected.clone();
        let wait = async move { connected.wait_for(|up| *up).await.map(|_| ()) };
        match tokio::time::timeout(limit, wait).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => Err(BridgeError::NotConnected),
        }
    }

    /// Stop the reactor and wait until it has released the listener.
    /// Pending callers get [`BridgeError::Disconnected`].
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ReactorCommand::Shutdown).await;
        // The reactor drops its end of the watch channel on exit
        let mut connected = self.connected.clone();
        while connected.changed().await.is_ok() {}
    }
}

#[async_trait]
impl Bridge for SocketBridge {
    #[instrument(name = "socket_send", skip_all, fields(command = %request.command))]
    async fn send(&self, request: Request) -> Result<Response, BridgeError> {
        let (response_tx, response_rx) = oneshot::channel();
        let line = encode_line(&request.to_value());

        self.cmd_tx
            .send(ReactorCommand::Request { line, response_tx })
            .await
            .map_err(|_| BridgeError::Closed)?;

        match tokio::time::timeout(self.request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                debug!(timeout = ?self.request_timeout, "gave up waiting");
                Err(BridgeError::Timeout(self.request_timeout))
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }
}

/// The reactor task - owns the listener and the host connection.
///
/// Interleaves caller commands, new connections and inbound bytes. Only
/// this task ever writes to the connection.
async fn reactor_task(
    listener: TcpListener,
    mut cmd_rx: mpsc::Receiver<ReactorCommand>,
    connected: watch::Sender<bool>,
) {
    let mut host: Option<HostConnection> = None;
    let mut pending: VecDeque<Reply> = VecDeque::new();
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUF_LEN];

    debug!("reactor started");

    loop {
        let event = tokio::select! {
            // Callers first so a chatty host cannot starve them
            biased;

            cmd = cmd_rx.recv() => Event::Command(cmd),
            accepted = listener.accept() => Event::Accepted(accepted),
            read = read_some(host.as_mut().map(|h| &mut h.reader), &mut buf) => Event::Read(read),
        };

        match event {
            Event::Command(Some(ReactorCommand::Request { line, response_tx })) => {
                let Some(conn) = host.as_mut() else {
                    let _ = response_tx.send(Err(BridgeError::NotConnected));
                    continue;
                };
                if let Err(e) = conn.writer.write_all(&line).await {
                    let _ = response_tx.send(Err(BridgeError::Disconnected));
                    drop_host(&mut host, &mut pending, &mut framer, &connected, &e.to_string());
                    continue;
                }
                pending.push_back(response_tx);
                trace!(pending = pending.len(), "request written");
            }
            Event::Command(Some(ReactorCommand::Shutdown)) | Event::Command(None) => {
                info!(pending = pending.len(), "socket bridge shutting down");
                drop_host(&mut host, &mut pending, &mut framer, &connected, "shutdown");
                break;
            }
            Event::Accepted(Ok((stream, peer))) => {
                if host.is_some() {
                    drop_host(&mut host, &mut pending, &mut framer, &connected, "replaced");
                }
                let _ = stream.set_nodelay(true);
                let (reader, writer) = stream.into_split();
                host = Some(HostConnection {
                    peer,
                    reader,
                    writer,
                });
                connected.send_replace(true);
                info!(%peer, "host connected");
            }
            Event::Accepted(Err(e)) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
            Event::Read(Ok(0)) => {
                drop_host(&mut host, &mut pending, &mut framer, &connected, "peer closed");
            }
            Event::Read(Err(e)) => {
                drop_host(&mut host, &mut pending, &mut framer, &connected, &e.to_string());
            }
            Event::Read(Ok(n)) => match framer.push(&buf[..n]) {
                Ok(lines) => {
                    for line in lines {
                        deliver(&mut pending, &line);
                    }
                }
                Err(e) => {
                    drop_host(&mut host, &mut pending, &mut framer, &connected, &e.to_string());
                }
            },
        }
    }

    debug!("reactor exiting");
}

/// Read from the host if there is one; otherwise never resolve.
async fn read_some(reader: Option<&mut OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Hand one inbound line to the oldest waiting caller.
fn deliver(pending: &mut VecDeque<Reply>, line: &str) {
    let result = Response::decode(line.as_bytes(), DecodeMode::Strict).map_err(BridgeError::from);
    match pending.pop_front() {
        Some(response_tx) => {
            if response_tx.send(result).is_err() {
                debug!("discarding late response, caller already gave up");
            }
        }
        None => debug!(%line, "discarding unsolicited response"),
    }
}

/// Forget the connection. Replies to anything already written can never be
/// attributed now, so every pending caller fails.
fn drop_host(
    host: &mut Option<HostConnection>,
    pending: &mut VecDeque<Reply>,
    framer: &mut LineFramer,
    connected: &watch::Sender<bool>,
    reason: &str,
) {
    if let Some(old) = host.take() {
        info!(peer = %old.peer, %reason, pending = pending.len(), "host disconnected");
    }
    for response_tx in pending.drain(..) {
        let _ = response_tx.send(Err(BridgeError::Disconnected));
    }
    framer.reset();
    connected.send_replace(false);
}
