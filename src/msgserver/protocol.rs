// Wire format for the relay protocol
//
// Every exchange is one request and one response over a fresh TCP stream.
// All integers are little-endian and every field has a fixed width except
// message content, which is prefixed with its length.

use crate::msgserver::error::ProtocolError;
use crate::msgserver::message::MessageKind;
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Protocol version written on every response
pub const VERSION: u8 = 1;

/// Size of a client identifier on the wire
pub const CLIENT_ID_SIZE: usize = 16;

/// Size of the NUL-padded username field
pub const USERNAME_SIZE: usize = 255;

/// Size of a public key blob
pub const PUBLIC_KEY_SIZE: usize = 160;

/// One entry of a client list response
pub const CLIENT_ENTRY_SIZE: usize = CLIENT_ID_SIZE + USERNAME_SIZE;

/// Registration payload: username followed by public key
pub const REGISTER_PAYLOAD_SIZE: usize = USERNAME_SIZE + PUBLIC_KEY_SIZE;

/// Fixed part of a send-message payload: destination, kind, content length
const SEND_PREFIX_SIZE: usize = CLIENT_ID_SIZE + 1 + 4;

/// 128-bit client identifier assigned at registration
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// All-zero id, used by clients that have not registered yet
    pub const UNASSIGNED: ClientId = ClientId([0; CLIENT_ID_SIZE]);

    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }

    /// Generate a fresh random (UUID v4) identifier
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self)
    }
}

impl FromStr for ClientId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; CLIENT_ID_SIZE];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Opaque public key blob, stored and returned verbatim
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| ProtocolError::PayloadSize {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(key))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

/// Request operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Register = 600,
    ListClients = 601,
    PublicKey = 602,
    SendMessage = 603,
    PendingMessages = 604,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            600 => Some(Opcode::Register),
            601 => Some(Opcode::ListClients),
            602 => Some(Opcode::PublicKey),
            603 => Some(Opcode::SendMessage),
            604 => Some(Opcode::PendingMessages),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Success code answering this opcode
    pub fn success_code(self) -> ResponseCode {
        match self {
            Opcode::Register => ResponseCode::Registered,
            Opcode::ListClients => ResponseCode::ClientList,
            Opcode::PublicKey => ResponseCode::PublicKey,
            Opcode::SendMessage => ResponseCode::MessageSent,
            Opcode::PendingMessages => ResponseCode::PendingMessages,
        }
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    Registered = 2100,
    ClientList = 2101,
    PublicKey = 2102,
    MessageSent = 2103,
    PendingMessages = 2104,
    Error = 9000,
}

impl ResponseCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2100 => Some(ResponseCode::Registered),
            2101 => Some(ResponseCode::ClientList),
            2102 => Some(ResponseCode::PublicKey),
            2103 => Some(ResponseCode::MessageSent),
            2104 => Some(ResponseCode::PendingMessages),
            9000 => Some(ResponseCode::Error),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Fixed 23-byte request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub opcode: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    pub const SIZE: usize = 23;

    pub fn parse(bytes: &[u8; Self::SIZE]) -> Self {
        let mut client_id = [0u8; CLIENT_ID_SIZE];
        client_id.copy_from_slice(&bytes[..16]);
        Self {
            client_id: ClientId(client_id),
            version: bytes[16],
            opcode: u16::from_le_bytes([bytes[17], bytes[18]]),
            payload_size: u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..16].copy_from_slice(&self.client_id.0);
        bytes[16] = self.version;
        bytes[17..19].copy_from_slice(&self.opcode.to_le_bytes());
        bytes[19..23].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes
    }
}

/// Fixed 7-byte response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl ResponseHeader {
    pub const SIZE: usize = 7;

    pub fn parse(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            version: bytes[0],
            code: u16::from_le_bytes([bytes[1], bytes[2]]),
            payload_size: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.version;
        bytes[1..3].copy_from_slice(&self.code.to_le_bytes());
        bytes[3..7].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes
    }
}

/// A decoded request payload, tagged by operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        username: String,
        public_key: PublicKey,
    },
    ListClients,
    PublicKey {
        target: ClientId,
    },
    SendMessage {
        destination: ClientId,
        kind: MessageKind,
        content: Vec<u8>,
    },
    PendingMessages,
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Register { .. } => Opcode::Register,
            Request::ListClients => Opcode::ListClients,
            Request::PublicKey { .. } => Opcode::PublicKey,
            Request::SendMessage { .. } => Opcode::SendMessage,
            Request::PendingMessages => Opcode::PendingMessages,
        }
    }

    /// Second decode stage: interpret a complete payload for its opcode
    pub fn decode(opcode: u16, payload: &[u8]) -> Result<Self, ProtocolError> {
        let opcode = Opcode::from_u16(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;
        let mut reader = PayloadReader::new(payload);

        let request = match opcode {
            Opcode::Register => {
                expect_size(payload, REGISTER_PAYLOAD_SIZE)?;
                let username = decode_username(reader.take(USERNAME_SIZE)?)?;
                let public_key = PublicKey(reader.array()?);
                Request::Register {
                    username,
                    public_key,
                }
            }
            Opcode::ListClients => Request::ListClients,
            Opcode::PublicKey => {
                expect_size(payload, CLIENT_ID_SIZE)?;
                Request::PublicKey {
                    target: ClientId(reader.array()?),
                }
            }
            Opcode::SendMessage => {
                let destination = ClientId(reader.array()?);
                let kind_byte = reader.u8()?;
                let kind = MessageKind::from_u8(kind_byte)
                    .ok_or(ProtocolError::InvalidMessageKind(kind_byte))?;
                let declared = reader.u32()?;
                if reader.remaining() != declared as usize {
                    return Err(ProtocolError::ContentLength {
                        declared,
                        actual: reader.remaining(),
                    });
                }
                let content = reader.take(declared as usize)?.to_vec();
                Request::SendMessage {
                    destination,
                    kind,
                    content,
                }
            }
            Opcode::PendingMessages => Request::PendingMessages,
        };

        reader.finish()?;
        Ok(request)
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();
        match self {
            Request::Register {
                username,
                public_key,
            } => {
                payload.reserve(REGISTER_PAYLOAD_SIZE);
                payload.extend_from_slice(&encode_username(username)?);
                payload.extend_from_slice(public_key.as_bytes());
            }
            Request::ListClients | Request::PendingMessages => {}
            Request::PublicKey { target } => payload.extend_from_slice(target.as_bytes()),
            Request::SendMessage {
                destination,
                kind,
                content,
            } => {
                payload.reserve(SEND_PREFIX_SIZE + content.len());
                payload.extend_from_slice(destination.as_bytes());
                payload.push(kind.to_u8());
                payload.extend_from_slice(&length_prefix(content.len())?);
                payload.extend_from_slice(content);
            }
        }
        Ok(payload)
    }

    /// Full request frame: header followed by payload
    pub fn to_bytes(&self, client_id: ClientId) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.encode_payload()?;
        let header = RequestHeader {
            client_id,
            version: VERSION,
            opcode: self.opcode().to_u16(),
            payload_size: u32::from_le_bytes(length_prefix(payload.len())?),
        };

        let mut frame = Vec::with_capacity(RequestHeader::SIZE + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

/// One row of a client list response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    pub client_id: ClientId,
    pub username: String,
}

/// One queued message as delivered to its recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub sender: ClientId,
    pub message_id: u32,
    pub kind: MessageKind,
    pub content: Vec<u8>,
}

/// A response, either the success shape for one operation or the generic error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Registered {
        client_id: ClientId,
    },
    ClientList {
        clients: Vec<ClientEntry>,
    },
    PublicKey {
        client_id: ClientId,
        public_key: PublicKey,
    },
    MessageSent {
        destination: ClientId,
        message_id: u32,
    },
    PendingMessages {
        messages: Vec<PendingMessage>,
    },
    Error,
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Response::Registered { .. } => ResponseCode::Registered,
            Response::ClientList { .. } => ResponseCode::ClientList,
            Response::PublicKey { .. } => ResponseCode::PublicKey,
            Response::MessageSent { .. } => ResponseCode::MessageSent,
            Response::PendingMessages { .. } => ResponseCode::PendingMessages,
            Response::Error => ResponseCode::Error,
        }
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();
        match self {
            Response::Registered { client_id } => payload.extend_from_slice(client_id.as_bytes()),
            Response::ClientList { clients } => {
                payload.reserve(clients.len() * CLIENT_ENTRY_SIZE);
                for entry in clients {
                    payload.extend_from_slice(entry.client_id.as_bytes());
                    payload.extend_from_slice(&encode_username(&entry.username)?);
                }
            }
            Response::PublicKey {
                client_id,
                public_key,
            } => {
                payload.extend_from_slice(client_id.as_bytes());
                payload.extend_from_slice(public_key.as_bytes());
            }
            Response::MessageSent {
                destination,
                message_id,
            } => {
                payload.extend_from_slice(destination.as_bytes());
                payload.extend_from_slice(&message_id.to_le_bytes());
            }
            Response::PendingMessages { messages } => {
                for message in messages {
                    payload.extend_from_slice(message.sender.as_bytes());
                    payload.extend_from_slice(&message.message_id.to_le_bytes());
                    payload.push(message.kind.to_u8());
                    payload.extend_from_slice(&length_prefix(message.content.len())?);
                    payload.extend_from_slice(&message.content);
                }
            }
            Response::Error => {}
        }
        Ok(payload)
    }

    /// Full response frame: header followed by payload
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.encode_payload()?;
        let header = ResponseHeader {
            version: VERSION,
            code: self.code().to_u16(),
            payload_size: u32::from_le_bytes(length_prefix(payload.len())?),
        };

        let mut frame = Vec::with_capacity(ResponseHeader::SIZE + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Interpret a complete response payload according to its code
    pub fn decode(code: u16, payload: &[u8]) -> Result<Self, ProtocolError> {
        let code = ResponseCode::from_u16(code).ok_or(ProtocolError::UnknownResponseCode(code))?;
        let mut reader = PayloadReader::new(payload);

        let response = match code {
            ResponseCode::Registered => {
                expect_size(payload, CLIENT_ID_SIZE)?;
                Response::Registered {
                    client_id: ClientId(reader.array()?),
                }
            }
            ResponseCode::ClientList => {
                if payload.len() % CLIENT_ENTRY_SIZE != 0 {
                    return Err(ProtocolError::PayloadSize {
                        expected: payload.len() / CLIENT_ENTRY_SIZE * CLIENT_ENTRY_SIZE,
                        actual: payload.len(),
                    });
                }
                let mut clients = Vec::with_capacity(payload.len() / CLIENT_ENTRY_SIZE);
                while reader.remaining() > 0 {
                    let client_id = ClientId(reader.array()?);
                    let username = decode_username(reader.take(USERNAME_SIZE)?)?;
                    clients.push(ClientEntry {
                        client_id,
                        username,
                    });
                }
                Response::ClientList { clients }
            }
            ResponseCode::PublicKey => {
                expect_size(payload, CLIENT_ID_SIZE + PUBLIC_KEY_SIZE)?;
                Response::PublicKey {
                    client_id: ClientId(reader.array()?),
                    public_key: PublicKey(reader.array()?),
                }
            }
            ResponseCode::MessageSent => {
                expect_size(payload, CLIENT_ID_SIZE + 4)?;
                Response::MessageSent {
                    destination: ClientId(reader.array()?),
                    message_id: reader.u32()?,
                }
            }
            ResponseCode::PendingMessages => {
                let mut messages = Vec::new();
                while reader.remaining() > 0 {
                    let sender = ClientId(reader.array()?);
                    let message_id = reader.u32()?;
                    let kind_byte = reader.u8()?;
                    let kind = MessageKind::from_u8(kind_byte)
                        .ok_or(ProtocolError::InvalidMessageKind(kind_byte))?;
                    let length = reader.u32()? as usize;
                    let content = reader.take(length)?.to_vec();
                    messages.push(PendingMessage {
                        sender,
                        message_id,
                        kind,
                        content,
                    });
                }
                Response::PendingMessages { messages }
            }
            ResponseCode::Error => Response::Error,
        };

        reader.finish()?;
        Ok(response)
    }
}

/// First decode stage: read exactly one request header
pub async fn read_request_header<R>(reader: &mut R) -> Result<RequestHeader, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; RequestHeader::SIZE];
    reader.read_exact(&mut bytes).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::HeaderTruncated {
                expected: RequestHeader::SIZE,
            }
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(RequestHeader::parse(&bytes))
}

/// Read exactly the payload the header declares, refusing oversized claims
/// before allocating
pub async fn read_payload<R>(
    reader: &mut R,
    declared: u32,
    max_payload: u32,
) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    if declared > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            size: declared,
            max: max_payload,
        });
    }

    let mut payload = vec![0u8; declared as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::PayloadTruncated { declared }
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(payload)
}

/// Read a response header and its full payload
pub async fn read_response<R>(reader: &mut R) -> Result<(ResponseHeader, Vec<u8>), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; ResponseHeader::SIZE];
    reader.read_exact(&mut bytes).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::HeaderTruncated {
                expected: ResponseHeader::SIZE,
            }
        } else {
            ProtocolError::Io(e)
        }
    })?;
    let header = ResponseHeader::parse(&bytes);
    let payload = read_payload(reader, header.payload_size, u32::MAX).await?;
    Ok((header, payload))
}

/// Encode and write one response frame
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = response.to_bytes()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// NUL-pad a username into its fixed field
pub fn encode_username(username: &str) -> Result<[u8; USERNAME_SIZE], ProtocolError> {
    validate_username(username)?;
    let mut field = [0u8; USERNAME_SIZE];
    field[..username.len()].copy_from_slice(username.as_bytes());
    Ok(field)
}

/// Extract the username up to the first NUL. Bytes after the terminator are
/// ignored.
pub fn decode_username(field: &[u8]) -> Result<String, ProtocolError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::MissingNulTerminator)?;
    let username = std::str::from_utf8(&field[..end])
        .map_err(|_| ProtocolError::InvalidUsername("not ASCII".to_string()))?;
    validate_username(username)?;
    Ok(username.to_string())
}

/// Usernames are non-empty printable ASCII and leave room for the terminator
pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
    if username.is_empty() {
        return Err(ProtocolError::InvalidUsername("empty".to_string()));
    }
    if username.len() >= USERNAME_SIZE {
        return Err(ProtocolError::InvalidUsername(format!(
            "{} bytes, at most {} allowed",
            username.len(),
            USERNAME_SIZE - 1
        )));
    }
    if !username.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) {
        return Err(ProtocolError::InvalidUsername(
            "contains non-printable characters".to_string(),
        ));
    }
    Ok(())
}

fn expect_size(payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() != expected {
        return Err(ProtocolError::PayloadSize {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn length_prefix(len: usize) -> Result<[u8; 4], ProtocolError> {
    let len = u32::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })?;
    Ok(len.to_le_bytes())
}

/// Bounds-checked cursor over a payload
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn finish(self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ClientId {
        ClientId::from_bytes([byte; CLIENT_ID_SIZE])
    }

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader {
            client_id: id(0xAB),
            version: 1,
            opcode: 603,
            payload_size: 0x0102_0304,
        };

        let bytes = header.to_bytes();
        assert_eq!(&bytes[..16], &[0xAB; 16]);
        assert_eq!(bytes[16], 1);
        assert_eq!(&bytes[17..19], &[0x5B, 0x02]); // 603 LE
        assert_eq!(&bytes[19..23], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(RequestHeader::parse(&bytes), header);
    }

    #[test]
    fn test_error_response_shape() {
        let bytes = Response::Error.to_bytes().unwrap();
        assert_eq!(bytes, vec![1, 0x28, 0x23, 0, 0, 0, 0]); // 9000 LE
    }

    #[test]
    fn test_register_request_round_trip() {
        let request = Request::Register {
            username: "alice".to_string(),
            public_key: PublicKey::from_bytes([0x01; PUBLIC_KEY_SIZE]),
        };

        let payload = request.encode_payload().unwrap();
        assert_eq!(payload.len(), REGISTER_PAYLOAD_SIZE);
        assert_eq!(&payload[..6], b"alice\0");
        assert!(payload[5..USERNAME_SIZE].iter().all(|&b| b == 0));

        let decoded = Request::decode(Opcode::Register.to_u16(), &payload).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_register_rejects_wrong_size_and_missing_nul() {
        let short = vec![0u8; REGISTER_PAYLOAD_SIZE - 1];
        assert!(matches!(
            Request::decode(600, &short),
            Err(ProtocolError::PayloadSize { .. })
        ));

        let no_nul = vec![b'a'; REGISTER_PAYLOAD_SIZE];
        assert!(matches!(
            Request::decode(600, &no_nul),
            Err(ProtocolError::MissingNulTerminator)
        ));

        let empty_name = vec![0u8; REGISTER_PAYLOAD_SIZE];
        assert!(matches!(
            Request::decode(600, &empty_name),
            Err(ProtocolError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_send_message_round_trip() {
        let request = Request::SendMessage {
            destination: id(7),
            kind: MessageKind::Text,
            content: b"hi".to_vec(),
        };

        let payload = request.encode_payload().unwrap();
        assert_eq!(payload.len(), 16 + 1 + 4 + 2);
        assert_eq!(payload[16], 3);
        assert_eq!(&payload[17..21], &[2, 0, 0, 0]);

        assert_eq!(Request::decode(603, &payload).unwrap(), request);
    }

    #[test]
    fn test_send_message_rejects_content_mismatch_and_bad_kind() {
        let mut payload = Request::SendMessage {
            destination: id(7),
            kind: MessageKind::File,
            content: vec![9; 10],
        }
        .encode_payload()
        .unwrap();

        payload.pop();
        assert!(matches!(
            Request::decode(603, &payload),
            Err(ProtocolError::ContentLength {
                declared: 10,
                actual: 9
            })
        ));

        payload.push(9);
        payload[16] = 5;
        assert!(matches!(
            Request::decode(603, &payload),
            Err(ProtocolError::InvalidMessageKind(5))
        ));
    }

    #[test]
    fn test_empty_payload_requests_reject_trailing_bytes() {
        assert_eq!(Request::decode(601, &[]).unwrap(), Request::ListClients);
        assert_eq!(Request::decode(604, &[]).unwrap(), Request::PendingMessages);
        assert!(matches!(
            Request::decode(604, &[0]),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            Request::decode(605, &[]),
            Err(ProtocolError::UnknownOpcode(605))
        ));
    }

    #[test]
    fn test_client_list_entry_layout() {
        let response = Response::ClientList {
            clients: vec![ClientEntry {
                client_id: id(1),
                username: "alice".to_string(),
            }],
        };

        let payload = response.encode_payload().unwrap();
        assert_eq!(payload.len(), CLIENT_ENTRY_SIZE);
        assert_eq!(&payload[16..21], b"alice");
        assert!(payload[21..].iter().all(|&b| b == 0));

        assert_eq!(Response::decode(2101, &payload).unwrap(), response);
        assert!(Response::decode(2101, &payload[..270]).is_err());
    }

    #[test]
    fn test_pending_messages_response_round_trip() {
        let response = Response::PendingMessages {
            messages: vec![
                PendingMessage {
                    sender: id(1),
                    message_id: 1,
                    kind: MessageKind::KeyRequest,
                    content: Vec::new(),
                },
                PendingMessage {
                    sender: id(2),
                    message_id: 2,
                    kind: MessageKind::Text,
                    content: b"hi".to_vec(),
                },
            ],
        };

        let payload = response.encode_payload().unwrap();
        assert_eq!(payload.len(), 25 + 27);
        assert_eq!(Response::decode(2104, &payload).unwrap(), response);
    }

    #[test]
    fn test_public_key_and_message_sent_round_trip() {
        let key = Response::PublicKey {
            client_id: id(3),
            public_key: PublicKey::from_bytes([0x42; PUBLIC_KEY_SIZE]),
        };
        let payload = key.encode_payload().unwrap();
        assert_eq!(payload.len(), 176);
        assert_eq!(Response::decode(2102, &payload).unwrap(), key);

        let sent = Response::MessageSent {
            destination: id(4),
            message_id: 77,
        };
        let payload = sent.encode_payload().unwrap();
        assert_eq!(&payload[16..], &77u32.to_le_bytes());
        assert_eq!(Response::decode(2103, &payload).unwrap(), sent);
    }

    #[test]
    fn test_client_id_hex() {
        let id: ClientId = "000102030405060708090a0b0c0d0e0f".parse().unwrap();
        assert_eq!(id.as_bytes()[15], 0x0f);
        assert_eq!(id.to_string(), "000102030405060708090a0b0c0d0e0f");
        assert!("0001".parse::<ClientId>().is_err());
        assert_ne!(ClientId::random(), ClientId::random());
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("bob smith").is_ok());
        assert!(validate_username(&"x".repeat(254)).is_ok());
        assert!(validate_username(&"x".repeat(255)).is_err());
        assert!(validate_username("tab\there").is_err());
        assert!(encode_username("").is_err());
    }

    #[tokio::test]
    async fn test_read_payload_short_read_is_truncation() {
        let mut reader: &[u8] = &[1, 2, 3];
        let err = read_payload(&mut reader, 5, 1024).await.unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTruncated { declared: 5 }));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_read_payload_rejects_oversized_declaration() {
        let mut reader: &[u8] = &[];
        let err = read_payload(&mut reader, 2048, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadTooLarge {
                size: 2048,
                max: 1024
            }
        ));
    }

    #[tokio::test]
    async fn test_read_request_header_short_read() {
        let mut reader: &[u8] = &[0u8; 10];
        assert!(matches!(
            read_request_header(&mut reader).await,
            Err(ProtocolError::HeaderTruncated { expected: 23 })
        ));
    }
}
