// CLI for the demo relay client

use crate::msgserver::message::MessageKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relay client command line
#[derive(Debug, Parser)]
#[command(name = "relay-client")]
#[command(about = "Exercise a msgrelay server from the command line")]
pub struct RelayCli {
    /// Server address
    #[arg(short, long, global = true, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,

    /// File holding this client's name and id
    #[arg(short, long, global = true, default_value = "me.info")]
    pub identity: PathBuf,

    #[command(subcommand)]
    pub command: ClientCommand,
}

/// Relay client subcommands
#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    /// Register a new user and save the assigned id
    Register {
        /// Username (printable ASCII, at most 254 bytes)
        #[arg(short, long)]
        name: String,

        /// File with the 160-byte public key (random if omitted)
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// List the other registered clients
    ListClients,

    /// Fetch another client's public key
    PublicKey {
        /// Hex client id
        #[arg(short, long)]
        target: String,
    },

    /// Queue a message for another client
    Send {
        /// Hex client id of the recipient
        #[arg(short, long)]
        to: String,

        /// Message kind
        #[arg(short, long, value_enum, default_value = "text")]
        kind: KindArg,

        /// Text content
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Send the contents of a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Fetch and consume pending messages
    Pending,
}

/// Message kind as written on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    KeyRequest,
    KeyDelivery,
    Text,
    File,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::KeyRequest => MessageKind::KeyRequest,
            KindArg::KeyDelivery => MessageKind::KeyDelivery,
            KindArg::Text => MessageKind::Text,
            KindArg::File => MessageKind::File,
        }
    }
}
