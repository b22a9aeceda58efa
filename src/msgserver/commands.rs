// Command handlers for the relay client CLI

use crate::msgserver::cli::{ClientCommand, RelayCli};
use crate::msgserver::client::RelayClient;
use crate::msgserver::identity::Identity;
use crate::msgserver::message::MessageKind;
use crate::msgserver::protocol::{ClientId, PublicKey, PUBLIC_KEY_SIZE};
use anyhow::{Context, Result};
use rand::RngCore;
use std::path::Path;

/// Execute a relay client command
pub async fn execute_command(cli: RelayCli) -> Result<()> {
    match &cli.command {
        ClientCommand::Register { name, key_file } => {
            handle_register(&cli, name, key_file.as_deref()).await
        }
        ClientCommand::ListClients => handle_list_clients(&cli).await,
        ClientCommand::PublicKey { target } => handle_public_key(&cli, target).await,
        ClientCommand::Send {
            to,
            kind,
            text,
            file,
        } => handle_send(&cli, to, (*kind).into(), text.as_deref(), file.as_deref()).await,
        ClientCommand::Pending => handle_pending(&cli).await,
    }
}

fn registered_client(cli: &RelayCli) -> Result<(Identity, RelayClient)> {
    let identity = Identity::load(&cli.identity)?;
    let client = RelayClient::with_id(cli.server, identity.client_id()?);
    Ok((identity, client))
}

fn parse_client_id(hex_id: &str) -> Result<ClientId> {
    hex_id
        .parse()
        .with_context(|| format!("Invalid client id {:?}: expected 32 hex characters", hex_id))
}

fn load_public_key(key_file: Option<&Path>) -> Result<PublicKey> {
    match key_file {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read key file {:?}", path))?;
            PublicKey::try_from(bytes.as_slice()).with_context(|| {
                format!("Key file {:?} must hold exactly {} bytes", path, PUBLIC_KEY_SIZE)
            })
        }
        None => {
            let mut key = [0u8; PUBLIC_KEY_SIZE];
            rand::thread_rng().fill_bytes(&mut key);
            Ok(PublicKey::from_bytes(key))
        }
    }
}

async fn handle_register(cli: &RelayCli, name: &str, key_file: Option<&Path>) -> Result<()> {
    if cli.identity.exists() {
        anyhow::bail!(
            "Already registered: {:?} exists. Remove it to register again.",
            cli.identity
        );
    }

    let public_key = load_public_key(key_file)?;
    let mut client = RelayClient::new(cli.server);
    let client_id = client
        .register(name, public_key)
        .await
        .context("Registration failed (username may be taken)")?;

    Identity::new(name.to_string(), client_id).save_new(&cli.identity)?;

    println!("✓ Registered '{}'", name);
    println!("  Client ID: {}", client_id);
    println!("  Identity saved to {:?}", cli.identity);
    Ok(())
}

async fn handle_list_clients(cli: &RelayCli) -> Result<()> {
    let (_, client) = registered_client(cli)?;
    let clients = client.list_clients().await.context("Failed to list clients")?;

    if clients.is_empty() {
        println!("No other clients registered");
        return Ok(());
    }

    println!("{} client(s):", clients.len());
    for entry in clients {
        println!("  {}  {}", entry.client_id, entry.username);
    }
    Ok(())
}

async fn handle_public_key(cli: &RelayCli, target: &str) -> Result<()> {
    let (_, client) = registered_client(cli)?;
    let target = parse_client_id(target)?;
    let key = client
        .public_key(target)
        .await
        .with_context(|| format!("Failed to fetch public key for {}", target))?;

    println!("Public key for {}:", target);
    println!("{}", hex::encode(key.as_bytes()));
    Ok(())
}

async fn handle_send(
    cli: &RelayCli,
    to: &str,
    kind: MessageKind,
    text: Option<&str>,
    file: Option<&Path>,
) -> Result<()> {
    let (identity, client) = registered_client(cli)?;
    let destination = parse_client_id(to)?;

    let content = match (text, file) {
        (Some(text), _) => text.as_bytes().to_vec(),
        (None, Some(path)) => {
            std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?
        }
        (None, None) => Vec::new(),
    };
    let size = content.len();

    let message_id = client
        .send_message(destination, kind, content)
        .await
        .context("Send failed (recipient may not exist)")?;

    println!("✓ Message {} queued", message_id);
    println!("  From: {} ({})", identity.name, identity.client_id);
    println!("  To: {}", destination);
    println!("  Kind: {}, {} bytes", kind, size);
    Ok(())
}

async fn handle_pending(cli: &RelayCli) -> Result<()> {
    let (_, client) = registered_client(cli)?;
    let messages = client
        .pending_messages()
        .await
        .context("Failed to fetch pending messages")?;

    if messages.is_empty() {
        println!("No pending messages");
        return Ok(());
    }

    for (i, message) in messages.iter().enumerate() {
        println!("\nMessage {}:", i + 1);
        println!("  From: {}", message.sender);
        println!("  Message ID: {}", message.message_id);
        println!("  Kind: {}", message.kind);
        if message.content.is_empty() {
            continue;
        }
        match std::str::from_utf8(&message.content) {
            Ok(text) if message.kind == MessageKind::Text => println!("  Content: {}", text),
            _ => println!("  Content (hex): {}", hex::encode(&message.content)),
        }
    }
    Ok(())
}
