//! Listener and accept loop for the relay server

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::liveness::spawn_liveness_sweep;
use crate::router::Router;
use crate::session_registry::ConnectionId;
use log::{error, info};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// WebSocket relay: accepts connections and hands them to the router
pub struct RelayServer {
    listener: TcpListener,
    router: Arc<Router>,
    config: ServerConfig,
    next_conn_id: ConnectionId,
}

impl RelayServer {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        config.validate()?;

        let listener = TcpListener::bind(config.address()).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        Ok(RelayServer {
            listener,
            router: Arc::new(Router::new()),
            config,
            next_conn_id: 1,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Starts the liveness sweep and accepts connections until cancelled
    pub async fn run(mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let sweeper = spawn_liveness_sweep(
            Arc::clone(&self.router),
            self.config.sweep_interval,
            self.config.stale_threshold,
        );
        let _sweeper = AbortOnDrop(sweeper);

        info!(
            "Relay started (sweep every {:?}, stale after {:?})",
            self.config.sweep_interval, self.config.stale_threshold
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = self.next_conn_id;
                    self.next_conn_id += 1;

                    tokio::spawn(handle_connection(
                        Arc::clone(&self.router),
                        stream,
                        addr,
                        conn_id,
                        self.config.outbound_queue,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Stops the sweep when the accept loop is dropped
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
