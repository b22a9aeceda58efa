// Server configuration and port resolution

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

/// Port used when neither the command line nor a port file names one
pub const DEFAULT_PORT: u16 = 5000;

/// Default name of the file holding the listening port
pub const DEFAULT_PORT_FILE: &str = "myport.info";

/// Largest request payload accepted by default (16 MiB)
pub const DEFAULT_MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Upper bound on a request's declared payload length
    pub max_payload: u32,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Read the listening port from a port file.
///
/// Returns `Ok(None)` when the file does not exist; content that is not a
/// decimal port number is an error.
pub fn read_port_file(path: &Path) -> Result<Option<u16>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read port file {:?}", path))
        }
    };

    let port = contents
        .trim()
        .parse::<u16>()
        .with_context(|| format!("Invalid port in {:?}: {:?}", path, contents.trim()))?;

    Ok(Some(port))
}

/// Pick the listening port: explicit flag, then port file, then the default
pub fn resolve_port(explicit: Option<u16>, port_file: &Path) -> Result<u16> {
    if let Some(port) = explicit {
        return Ok(port);
    }

    match read_port_file(port_file)? {
        Some(port) => {
            tracing::debug!("Using port {} from {:?}", port, port_file);
            Ok(port)
        }
        None => {
            tracing::warn!(
                "Port file {:?} not found, using default port {}",
                port_file,
                DEFAULT_PORT
            );
            Ok(DEFAULT_PORT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5000");
        assert_eq!(config.max_payload, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn test_port_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("myport.info");

        assert_eq!(read_port_file(&path).unwrap(), None);

        std::fs::write(&path, "1357\n").unwrap();
        assert_eq!(read_port_file(&path).unwrap(), Some(1357));

        std::fs::write(&path, "not-a-port").unwrap();
        assert!(read_port_file(&path).is_err());
    }

    #[test]
    fn test_resolve_port_precedence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("port");

        assert_eq!(resolve_port(None, &path).unwrap(), DEFAULT_PORT);

        std::fs::write(&path, "6000").unwrap();
        assert_eq!(resolve_port(None, &path).unwrap(), 6000);
        assert_eq!(resolve_port(Some(7000), &path).unwrap(), 7000);
    }
}
