// Registered users and their public keys

use crate::msgserver::error::RegistryError;
use crate::msgserver::protocol::{ClientId, PublicKey};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: ClientId,
    pub username: String,
    pub public_key: PublicKey,
}

#[derive(Default)]
struct RegistryInner {
    /// Registration order, used for listing
    users: Vec<User>,
    by_id: HashMap<ClientId, usize>,
    by_name: HashMap<String, ClientId>,
}

/// Maps client ids to users. Users are never removed.
pub struct UserRegistry {
    inner: RwLock<RegistryInner>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a new user, failing if the username is taken.
    ///
    /// The uniqueness check and the insert happen under one write lock, so
    /// two racing registrations of the same name cannot both succeed.
    pub async fn register(
        &self,
        username: String,
        public_key: PublicKey,
    ) -> Result<ClientId, RegistryError> {
        let mut inner = self.inner.write().await;

        if inner.by_name.contains_key(&username) {
            return Err(RegistryError::DuplicateUsername(username));
        }

        let mut id = ClientId::random();
        while inner.by_id.contains_key(&id) {
            id = ClientId::random();
        }

        let index = inner.users.len();
        inner.by_id.insert(id, index);
        inner.by_name.insert(username.clone(), id);
        inner.users.push(User {
            id,
            username,
            public_key,
        });

        Ok(id)
    }

    pub async fn lookup(&self, id: ClientId) -> Option<User> {
        let inner = self.inner.read().await;
        inner.by_id.get(&id).map(|&index| inner.users[index].clone())
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.inner.read().await.by_id.contains_key(&id)
    }

    /// All users except `excluding`, in registration order
    pub async fn list(&self, excluding: ClientId) -> Vec<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .iter()
            .filter(|user| user.id != excluding)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
