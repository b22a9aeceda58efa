// Message relay server
//
// Clients register a username and public key, discover each other, and
// leave opaque messages that the server queues until the recipient polls.
// Every request is a single binary frame on its own TCP connection.

pub mod error;
pub mod protocol;
pub mod message;
pub mod registry;
pub mod broker;
pub mod config;
pub mod server;
pub mod client;
pub mod identity;
pub mod cli;
pub mod commands;

pub use error::{ClientError, ProtocolError, RegistryError, RelayError, StoreError};
pub use protocol::{ClientId, Opcode, PublicKey, Request, Response, ResponseCode};
pub use message::{MessageEnvelope, MessageKind, PendingStore};
pub use registry::{User, UserRegistry};
pub use broker::MessageBroker;
pub use config::ServerConfig;
pub use server::RelayServer;
pub use client::RelayClient;
pub use identity::Identity;
pub use cli::{ClientCommand, RelayCli};
pub use commands::execute_command;
