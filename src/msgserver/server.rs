// TCP acceptor: one task per connection

use crate::msgserver::broker::MessageBroker;
use crate::msgserver::config::ServerConfig;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// A bound relay server
pub struct RelayServer {
    listener: TcpListener,
    broker: Arc<MessageBroker>,
}

impl RelayServer {
    /// Bind the configured address. Failing to bind is fatal to startup.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self::from_listener(
            listener,
            Arc::new(MessageBroker::new(config.max_payload)),
        ))
    }

    /// Serve on an already bound listener
    pub fn from_listener(listener: TcpListener, broker: Arc<MessageBroker>) -> Self {
        Self { listener, broker }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn broker(&self) -> Arc<MessageBroker> {
        self.broker.clone()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already being served finish on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let RelayServer { listener, broker } = self;
        tokio::pin!(shutdown);

        tracing::info!("Listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Listener shutting down");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => spawn_connection(stream, peer, &broker),
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
            }
        }

        let users = broker.registry().len().await;
        let undelivered = broker.message_store().total_pending().await;
        tracing::info!(users, undelivered, "Server stopped");

        Ok(())
    }

    /// Accept connections until Ctrl+C
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn spawn_connection(mut stream: TcpStream, peer: SocketAddr, broker: &Arc<MessageBroker>) {
    let broker = Arc::clone(broker);
    tokio::spawn(async move {
        tracing::debug!(%peer, "New connection");
        match broker.serve(&mut stream).await {
            Ok(code) => tracing::debug!(%peer, code = code.to_u16(), "Connection closed"),
            Err(e) => tracing::warn!(%peer, error = %e, "Connection abandoned"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgserver::protocol::{self, ClientId, Request, ResponseCode};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = RelayServer::bind(&ServerConfig {
            port: 0,
            ..ServerConfig::default()
        })
        .await
        .unwrap();

        let taken = ServerConfig {
            port: first.local_addr().unwrap().port(),
            ..ServerConfig::default()
        };
        assert!(RelayServer::bind(&taken).await.is_err());
    }

    #[tokio::test]
    async fn test_acceptor_survives_bad_connection() {
        let server = RelayServer::bind(&ServerConfig {
            port: 0,
            ..ServerConfig::default()
        })
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        // Connect and hang up without sending anything
        drop(TcpStream::connect(addr).await.unwrap());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = Request::ListClients.to_bytes(ClientId::random()).unwrap();
        stream.write_all(&frame).await.unwrap();
        let (header, payload) = protocol::read_response(&mut stream).await.unwrap();
        assert_eq!(header.code, ResponseCode::Error.to_u16());
        assert!(payload.is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
