// src/server/mod.rs
//
// ChatServer - accept loop
//
// One task per accepted socket; sessions are fully independent and a
// session failure never propagates past its own task.

pub mod registry;
pub mod session;

pub use registry::{Peer, Registry};
pub use session::Session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl ChatServer {
    pub async fn bind(addr: SocketAddr) -> Result<ChatServer> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("🌐 [NET] listening on {}", listener.local_addr()?);
        Ok(ChatServer {
            listener,
            registry: Registry::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accept forever. Errors on a single accept are logged and survived;
    /// the loop only ends when the caller drops or aborts it.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("🌐 [NET] accepted {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("🌐 [NET] set_nodelay failed for {}: {}", addr, e);
                    }
                    Session::spawn(self.registry.clone(), stream);
                }
                Err(e) => {
                    tracing::warn!("⚠️ [NET] accept failed: {}", e);
                }
            }
        }
    }
}
