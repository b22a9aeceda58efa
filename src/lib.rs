//! msgrelay - Store-and-forward relay for end-to-end encrypted messages
//!
//! The server keeps a registry of users and their public keys and queues
//! opaque message payloads until each recipient collects them. It never
//! decrypts anything; key exchange and encryption are up to the clients.

pub mod msgserver;

pub use msgserver::{MessageBroker, RelayClient, RelayServer, ServerConfig};
