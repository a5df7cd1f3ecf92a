//! Listener/accept-loop shape (spec SPEC_FULL §6.1), grounded on the
//! teacher's `pg/service.rs` + `server/listener.rs`: a `Service` owns a
//! `TcpListener` and an accept loop that spawns one task per connection.
//!
//! The teacher's `Connections<C>` tracks live connections through leaked,
//! atomically-swapped raw pointers (`AtomicPtr`) for lock-free iteration
//! during idle-timeout sweeps. That's unsafe machinery earning its keep in
//! a connection pool under heavy churn; a capacity bound alone doesn't need
//! it, so this uses a safe `tokio::sync::Semaphore` instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::shardwire::common::Result;

/// Runs one accepted connection to completion. The wire-protocol session
/// loop itself (parsing client packets, calling into [`crate::shardwire::engine`],
/// writing backend/client replies) is the low-level socket I/O spec §1
/// calls out as an external collaborator; this trait is where it plugs in.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, socket: TcpStream) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

pub struct Service<H: ConnectionHandler> {
    address: String,
    listener: TcpListener,
    handler: Arc<H>,
    capacity: Arc<Semaphore>,
}

impl<H: ConnectionHandler> Service<H> {
    pub async fn bind(address: String, max_connections: u32, handler: H) -> Result<Self> {
        let listener = TcpListener::bind(&address).await?;
        Ok(Service { address, listener, handler: Arc::new(handler), capacity: Arc::new(Semaphore::new(max_connections as usize)) })
    }

    pub async fn run(&self) {
        info!(address = %self.address, "accepting connections");
        loop {
            let (socket, remote_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(%e, "accept error");
                    continue;
                }
            };
            let Ok(permit) = self.capacity.clone().try_acquire_owned() else {
                debug!(%remote_addr, "connection limit reached, dropping");
                continue;
            };
            debug!(%remote_addr, server = %self.address, "accepted connection");
            let handler = self.handler.clone();
            tokio::spawn(async move {
                handler.handle(socket).await;
                drop(permit);
            });
        }
    }
}
