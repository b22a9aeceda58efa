// Request dispatcher: one request in, one response out

use crate::msgserver::error::{ProtocolError, RelayError};
use crate::msgserver::message::{MessageKind, PendingStore};
use crate::msgserver::protocol::{
    self, ClientEntry, ClientId, Opcode, PublicKey, Request, Response, ResponseCode,
};
use crate::msgserver::registry::UserRegistry;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Routes decoded requests to the registry and the pending store.
///
/// The broker keeps no per-connection state; everything shared lives in the
/// registry and the store.
pub struct MessageBroker {
    registry: Arc<UserRegistry>,
    store: Arc<PendingStore>,
    max_payload: u32,
}

impl MessageBroker {
    /// Create a broker with an empty registry and store
    pub fn new(max_payload: u32) -> Self {
        Self::with_state(
            Arc::new(UserRegistry::new()),
            Arc::new(PendingStore::new()),
            max_payload,
        )
    }

    pub fn with_state(
        registry: Arc<UserRegistry>,
        store: Arc<PendingStore>,
        max_payload: u32,
    ) -> Self {
        Self {
            registry,
            store,
            max_payload,
        }
    }

    pub fn registry(&self) -> Arc<UserRegistry> {
        self.registry.clone()
    }

    pub fn message_store(&self) -> Arc<PendingStore> {
        self.store.clone()
    }

    /// Serve exactly one request on `stream` and shut it down.
    ///
    /// Decode and handler failures are answered with the generic error
    /// response. Transport failures while reading abandon the stream without
    /// a response and are returned to the caller.
    pub async fn serve<S>(&self, stream: &mut S) -> std::io::Result<ResponseCode>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = match self.read_and_dispatch(stream).await {
            Ok(response) => response,
            Err(RelayError::Malformed(ProtocolError::Io(e))) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "request rejected");
                Response::Error
            }
        };

        let code = response.code();
        if let Err(e) = protocol::write_response(stream, &response).await {
            tracing::warn!(error = %e, "failed to encode response");
            if let ProtocolError::Io(e) = e {
                return Err(e);
            }
            // Content too large to frame; the fixed error shape always fits
            protocol::write_response(stream, &Response::Error)
                .await
                .map_err(std::io::Error::other)?;
        }
        stream.shutdown().await?;

        Ok(code)
    }

    async fn read_and_dispatch<S>(&self, stream: &mut S) -> Result<Response, RelayError>
    where
        S: AsyncRead + Unpin,
    {
        let header = protocol::read_request_header(stream).await?;
        tracing::debug!(
            client_id = %header.client_id,
            version = header.version,
            opcode = header.opcode,
            payload_size = header.payload_size,
            "request header"
        );

        let payload = protocol::read_payload(stream, header.payload_size, self.max_payload).await?;
        let request = Request::decode(header.opcode, &payload)?;

        self.handle_request(header.client_id, request).await
    }

    /// Execute one decoded request on behalf of `requester`
    pub async fn handle_request(
        &self,
        requester: ClientId,
        request: Request,
    ) -> Result<Response, RelayError> {
        let opcode = request.opcode();

        if opcode != Opcode::Register {
            self.require_registered(requester).await?;
        }

        match request {
            Request::Register {
                username,
                public_key,
            } => self.handle_register(username, public_key).await,
            Request::ListClients => self.handle_list_clients(requester).await,
            Request::PublicKey { target } => self.handle_public_key(target).await,
            Request::SendMessage {
                destination,
                kind,
                content,
            } => self.handle_send(requester, destination, kind, content).await,
            Request::PendingMessages => self.handle_pending(requester).await,
        }
    }

    async fn require_registered(&self, id: ClientId) -> Result<(), RelayError> {
        if self.registry.contains(id).await {
            Ok(())
        } else {
            Err(RelayError::UnknownClient(id))
        }
    }

    async fn handle_register(
        &self,
        username: String,
        public_key: PublicKey,
    ) -> Result<Response, RelayError> {
        let client_id = self.registry.register(username.clone(), public_key).await?;
        tracing::info!(%client_id, "Registered new user: {}", username);
        Ok(Response::Registered { client_id })
    }

    async fn handle_list_clients(&self, requester: ClientId) -> Result<Response, RelayError> {
        let clients: Vec<ClientEntry> = self
            .registry
            .list(requester)
            .await
            .into_iter()
            .map(|user| ClientEntry {
                client_id: user.id,
                username: user.username,
            })
            .collect();

        tracing::info!(%requester, "Sent client list with {} entries", clients.len());
        Ok(Response::ClientList { clients })
    }

    async fn handle_public_key(&self, target: ClientId) -> Result<Response, RelayError> {
        let user = self
            .registry
            .lookup(target)
            .await
            .ok_or(RelayError::UnknownClient(target))?;

        Ok(Response::PublicKey {
            client_id: user.id,
            public_key: user.public_key,
        })
    }

    async fn handle_send(
        &self,
        sender: ClientId,
        destination: ClientId,
        kind: MessageKind,
        content: Vec<u8>,
    ) -> Result<Response, RelayError> {
        self.require_registered(destination).await?;

        let size = content.len();
        let message_id = self.store.enqueue(destination, sender, kind, content).await?;

        tracing::info!(
            message_id,
            %sender,
            %destination,
            %kind,
            "Message of {} bytes queued",
            size
        );
        Ok(Response::MessageSent {
            destination,
            message_id,
        })
    }

    async fn handle_pending(&self, requester: ClientId) -> Result<Response, RelayError> {
        let messages: Vec<_> = self
            .store
            .drain_all(requester)
            .await
            .into_iter()
            .map(|envelope| envelope.into_pending())
            .collect();

        tracing::info!(%requester, "Delivered {} pending messages", messages.len());
        Ok(Response::PendingMessages { messages })
    }
}
