//! Host end of the socket transport.
//!
//! The host dials out to the controller's listener and keeps one connection.
//! Each inbound line is dispatched and answered before the next is read.
//!
//! [`ConnectionManager`] is the decision point: it grants every connect
//! attempt, holds the connection state and owns the line framer. The link
//! only executes those decisions. It dials when an attempt is granted, and
//! it drops the stream after reporting each error or EOF to the manager.

use scytheconf::SocketConfig;
use scytheproto::encode_line;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, trace};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::dispatch::Dispatcher;

const READ_BUF_LEN: usize = 8 * 1024;

/// Upper bound on one connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SocketLink {
    address: String,
    recv_timeout: Duration,
    manager: ConnectionManager,
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl SocketLink {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            address: config.address(),
            recv_timeout: config.recv_timeout(),
            manager: ConnectionManager::new(config.reconnect_interval()),
            stream: None,
            buf: vec![0; READ_BUF_LEN],
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Run until shutdown. Never returns early on transport errors.
    #[instrument(name = "socket_link", skip_all, fields(address = %self.address))]
    pub async fn run(
        mut self,
        dispatcher: Rc<RefCell<Dispatcher>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("socket link starting");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.step(&dispatcher) => {}
            }
        }
        self.close("shutdown");
        info!("socket link stopped");
    }

    /// One scheduler turn: wait/attempt a connect, or service one read.
    pub async fn step(&mut self, dispatcher: &RefCell<Dispatcher>) {
        match self.stream.is_some() {
            false => self.try_connect().await,
            true => self.service(dispatcher).await,
        }
    }

    async fn try_connect(&mut self) {
        if let Some(wait) = self.manager.until_next_attempt(Instant::now()) {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        if !self.manager.begin_attempt(Instant::now()) {
            return;
        }

        debug!("connecting");
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                // Responses are small and latency matters more than packing
                let _ = stream.set_nodelay(true);
                self.stream = Some(stream);
                self.manager.on_connected();
            }
            Ok(Err(e)) => self.manager.on_connect_failed(&e.to_string()),
            Err(_) => self.manager.on_connect_failed("timed out"),
        }
    }

    async fn service(&mut self, dispatcher: &RefCell<Dispatcher>) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let read = timeout(self.recv_timeout, stream.read(&mut self.buf)).await;
        let n = match read {
            // Nothing arrived this turn; give the scheduler back
            Err(_) => return,
            Ok(Ok(0)) => return self.close("peer closed"),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return self.close(&e.to_string()),
        };
        trace!(bytes = n, "read");

        let lines = match self.manager.on_bytes(&self.buf[..n]) {
            Ok(lines) => lines,
            Err(e) => return self.close(&e.to_string()),
        };

        for line in lines {
            let response = dispatcher.borrow_mut().dispatch_line(&line);
            let bytes = encode_line(&response.to_value());
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            if let Err(e) = stream.write_all(&bytes).await {
                return self.close(&e.to_string());
            }
        }
    }

    fn close(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            self.manager.on_transport_error(reason);
        }
    }
}
