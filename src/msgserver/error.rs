// Error types for the relay protocol, registry and dispatcher

use crate::msgserver::protocol::ClientId;
use thiserror::Error;

/// Errors raised while encoding or decoding the wire format
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The peer closed the stream before a complete header arrived
    #[error("connection closed before the {expected}-byte header was complete")]
    HeaderTruncated {
        /// Header size that was expected
        expected: usize,
    },

    /// The peer closed the stream before the declared payload arrived
    #[error("payload truncated: header declared {declared} bytes")]
    PayloadTruncated {
        /// Payload size from the header
        declared: u32,
    },

    /// Declared payload exceeds the configured maximum
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Declared payload size
        size: u32,
        /// Maximum accepted size
        max: u32,
    },

    /// Request opcode is not one of the known operations
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u16),

    /// Response code is not one the client understands
    #[error("unknown response code: {0}")]
    UnknownResponseCode(u16),

    /// Payload has the wrong fixed size for its opcode
    #[error("invalid payload size: expected {expected} bytes, got {actual}")]
    PayloadSize {
        /// Size required by the opcode
        expected: usize,
        /// Size received
        actual: usize,
    },

    /// Payload ended before a field could be read
    #[error("payload ended early: needed {needed} more bytes, {remaining} left")]
    UnexpectedEnd {
        /// Bytes the next field needs
        needed: usize,
        /// Bytes left in the payload
        remaining: usize,
    },

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Message content length does not match the bytes that follow it
    #[error("content length mismatch: declared {declared} bytes, {actual} present")]
    ContentLength {
        /// Length field value
        declared: u32,
        /// Bytes actually present
        actual: usize,
    },

    /// Username field has no NUL terminator
    #[error("username is not NUL-terminated")]
    MissingNulTerminator,

    /// Username is empty, too long, or not printable ASCII
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// Message kind byte is outside 1..=4
    #[error("invalid message kind: {0}")]
    InvalidMessageKind(u8),

    /// Socket failure other than a short read
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the failure happened on the socket rather than in the bytes
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

/// Registry failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another user already holds this name
    #[error("username already registered: {0}")]
    DuplicateUsername(String),
}

/// Pending-message store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The 32-bit message id space is used up
    #[error("message identifiers exhausted")]
    IdsExhausted,
}

/// Failures of a single relay request. Every variant is answered with the
/// generic error response except transport failures, which abandon the
/// connection.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Short or invalid header, wrong payload shape, unknown opcode
    #[error("malformed request: {0}")]
    Malformed(#[from] ProtocolError),

    /// A referenced client id is not registered
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),

    /// Registration under a taken username
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Message could not be queued
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors seen by the protocol client
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with the generic error code
    #[error("server returned an error response")]
    ServerError,

    /// The server answered with a success code for a different operation
    #[error("unexpected response code {actual}, expected {expected}")]
    UnexpectedResponse {
        /// Code the request should produce
        expected: u16,
        /// Code actually received
        actual: u16,
    },

    /// The response could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection failure
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}
