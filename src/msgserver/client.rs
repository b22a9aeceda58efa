// Protocol client: one TCP connection per request

use crate::msgserver::error::ClientError;
use crate::msgserver::message::MessageKind;
use crate::msgserver::protocol::{
    self, ClientEntry, ClientId, PendingMessage, PublicKey, Request, Response, ResponseCode,
    ResponseHeader,
};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Talks to a relay server on behalf of one client id
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: SocketAddr,
    client_id: ClientId,
}

impl RelayClient {
    /// A client that has not registered yet
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_id(addr, ClientId::UNASSIGNED)
    }

    /// A client acting as an already registered id
    pub fn with_id(addr: SocketAddr, client_id: ClientId) -> Self {
        Self { addr, client_id }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register a username and key, adopting the returned id
    pub async fn register(
        &mut self,
        username: &str,
        public_key: PublicKey,
    ) -> Result<ClientId, ClientError> {
        let request = Request::Register {
            username: username.to_string(),
            public_key,
        };
        match self.request(&request).await? {
            Response::Registered { client_id } => {
                self.client_id = client_id;
                Ok(client_id)
            }
            other => Err(unexpected(ResponseCode::Registered, &other)),
        }
    }

    /// Every other registered client
    pub async fn list_clients(&self) -> Result<Vec<ClientEntry>, ClientError> {
        match self.request(&Request::ListClients).await? {
            Response::ClientList { clients } => Ok(clients),
            other => Err(unexpected(ResponseCode::ClientList, &other)),
        }
    }

    pub async fn public_key(&self, target: ClientId) -> Result<PublicKey, ClientError> {
        match self.request(&Request::PublicKey { target }).await? {
            Response::PublicKey { public_key, .. } => Ok(public_key),
            other => Err(unexpected(ResponseCode::PublicKey, &other)),
        }
    }

    /// Queue a message for `destination`, returning the server's message id
    pub async fn send_message(
        &self,
        destination: ClientId,
        kind: MessageKind,
        content: Vec<u8>,
    ) -> Result<u32, ClientError> {
        let request = Request::SendMessage {
            destination,
            kind,
            content,
        };
        match self.request(&request).await? {
            Response::MessageSent { message_id, .. } => Ok(message_id),
            other => Err(unexpected(ResponseCode::MessageSent, &other)),
        }
    }

    /// Fetch and consume everything queued for this client
    pub async fn pending_messages(&self) -> Result<Vec<PendingMessage>, ClientError> {
        match self.request(&Request::PendingMessages).await? {
            Response::PendingMessages { messages } => Ok(messages),
            other => Err(unexpected(ResponseCode::PendingMessages, &other)),
        }
    }

    async fn request(&self, request: &Request) -> Result<Response, ClientError> {
        let frame = request.to_bytes(self.client_id)?;
        let (header, payload) = self.exchange(&frame).await?;

        match Response::decode(header.code, &payload)? {
            Response::Error => Err(ClientError::ServerError),
            response => Ok(response),
        }
    }

    /// Write raw bytes, half-close, and read back one response
    pub async fn exchange(&self, frame: &[u8]) -> Result<(ResponseHeader, Vec<u8>), ClientError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(frame).await?;
        stream.shutdown().await?;

        let response = protocol::read_response(&mut stream).await?;
        tracing::debug!(code = response.0.code, size = response.0.payload_size, "response");
        Ok(response)
    }
}

fn unexpected(expected: ResponseCode, actual: &Response) -> ClientError {
    ClientError::UnexpectedResponse {
        expected: expected.to_u16(),
        actual: actual.code().to_u16(),
    }
}
