//! Connection acceptor
//!
//! Owns the listening socket. Accepted connections are served on a task
//! tracker bounded by a semaphore; when every permit is taken the new
//! client is answered `ERROR|Server busy` and closed.

use crate::codec::response::{self, Response};
use crate::config::ServerConfig;
use crate::error::{ExchangeError, Result};
use crate::events::ExchangeEvent;
use crate::exchange::Exchange;
use crate::server::dispatcher::Dispatcher;
use crate::server::session::Session;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    accept_loop: JoinHandle<()>,
}

/// Mail exchange server: STOPPED -> LISTENING -> STOPPED
pub struct ExchangeServer {
    config: ServerConfig,
    exchange: Arc<Exchange>,
    running: Mutex<Option<Running>>,
}

impl ExchangeServer {
    pub fn new(config: ServerConfig, exchange: Arc<Exchange>) -> Self {
        Self {
            config,
            exchange,
            running: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Bind and start accepting; returns the bound address
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ExchangeError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Exchange server listening on {}", local_addr);
        info!("Users: {}", self.exchange.store().users().await.join(", "));

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let acceptor = Acceptor {
            listener,
            dispatcher: Dispatcher::new(Arc::clone(&self.exchange)),
            exchange: Arc::clone(&self.exchange),
            permits: Arc::new(Semaphore::new(self.config.max_connections)),
            max_line_length: self.config.max_line_length,
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
        };
        let accept_loop = tokio::spawn(acceptor.run());

        self.exchange
            .events()
            .publish(ExchangeEvent::Started { addr: local_addr });

        *running = Some(Running {
            local_addr,
            shutdown,
            tracker,
            accept_loop,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close the listener and wait (bounded) for handlers
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Err(ExchangeError::NotRunning);
        };
        info!("Stopping exchange server on {}", running.local_addr);

        running.shutdown.cancel();
        if let Err(e) = running.accept_loop.await {
            error!("Accept loop panicked: {}", e);
        }

        running.tracker.close();
        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, running.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "{} connection handlers still busy after {:?}, not waiting",
                running.tracker.len(),
                grace
            );
        }

        info!("Exchange server stopped");
        self.exchange.events().publish(ExchangeEvent::Stopped);
        Ok(())
    }

    /// Reload the storage file; the previous store stays on failure
    pub async fn reload(&self) -> Result<usize> {
        match self.exchange.reload().await {
            Ok(users) => Ok(users),
            Err(e) => {
                error!("Error reloading storage: {}", e);
                Err(e)
            }
        }
    }
}

struct Acceptor {
    listener: TcpListener,
    dispatcher: Dispatcher,
    exchange: Arc<Exchange>,
    permits: Arc<Semaphore>,
    max_line_length: usize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Acceptor {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.serve(stream, peer),
                Err(e) => {
                    error!("Error accepting client connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        // Dropping the listener closes the socket
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let events = self.exchange.events().clone();

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Worker pool saturated, rejecting connection from {}", peer);
                events.publish(ExchangeEvent::Rejected { peer });
                reject(stream, peer);
                return;
            }
        };

        info!("Opened connection from {}", peer);
        events.publish(ExchangeEvent::Accepted { peer });

        let session = Session::new(
            peer,
            self.dispatcher.clone(),
            self.max_line_length,
            self.shutdown.clone(),
        );
        self.tracker.spawn(async move {
            if let Err(e) = session.handle(stream).await {
                warn!("Connection from {} ended with error: {}", peer, e);
            }
            // Free the slot before announcing the close
            drop(permit);
            info!("Connection from {} closed", peer);
            events.publish(ExchangeEvent::Closed { peer });
        });
    }
}

/// Answer a client the pool has no room for, without spawning a task
///
/// The busy line is small enough for an empty send buffer, so a
/// non-blocking write either lands whole or the client goes unanswered.
fn reject(stream: TcpStream, peer: SocketAddr) {
    let line = format!("{}\n", Response::error(response::SERVER_BUSY));
    match stream.try_write(line.as_bytes()) {
        Ok(n) if n == line.len() => {}
        Ok(n) => debug!("Busy reply to {} cut short after {} bytes", peer, n),
        Err(e) => debug!("Could not send busy reply to {}: {}", peer, e),
    }
    // Dropping the stream closes the connection
}
