// Client identity file written after registration

use crate::msgserver::protocol::ClientId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Who this client is, as assigned by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    /// Hex-encoded client id
    pub client_id: String,
}

impl Identity {
    pub fn new(name: String, client_id: ClientId) -> Self {
        Self {
            name,
            client_id: client_id.to_string(),
        }
    }

    pub fn client_id(&self) -> Result<ClientId> {
        self.client_id
            .parse()
            .with_context(|| format!("Invalid client id in identity: {}", self.client_id))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read identity file {:?} (register first)", path)
        })?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse identity file {:?}", path))
    }

    /// Write the identity, refusing to replace an existing one
    pub fn save_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Identity file {:?} already exists", path);
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write identity file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_identity_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("me.info");
        let id = ClientId::random();

        let identity = Identity::new("alice".to_string(), id);
        identity.save_new(&path).unwrap();

        let loaded = Identity::load(&path).unwrap();
        assert_eq!(loaded, identity);
        assert_eq!(loaded.client_id().unwrap(), id);

        // A second registration must not clobber the first identity
        assert!(identity.save_new(&path).is_err());
    }

    #[test]
    fn test_missing_identity() {
        let dir = tempdir().unwrap();
        assert!(Identity::load(&dir.path().join("absent")).is_err());
    }
}
