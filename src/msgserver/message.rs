// Message envelopes and the per-recipient pending queue

use crate::msgserver::error::StoreError;
use crate::msgserver::protocol::{ClientId, PendingMessage};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::Mutex;

/// What a queued message carries. The server never looks inside the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Ask the recipient for a symmetric key
    KeyRequest = 1,
    /// Deliver a symmetric key, encrypted under the recipient's public key
    KeyDelivery = 2,
    /// Encrypted text
    Text = 3,
    /// Encrypted file contents
    File = 4,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageKind::KeyRequest),
            2 => Some(MessageKind::KeyDelivery),
            3 => Some(MessageKind::Text),
            4 => Some(MessageKind::File),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::KeyRequest => "key-request",
            MessageKind::KeyDelivery => "key-delivery",
            MessageKind::Text => "text",
            MessageKind::File => "file",
        };
        f.write_str(name)
    }
}

/// A message waiting for its recipient to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Process-wide id, strictly increasing
    pub id: u32,
    pub recipient: ClientId,
    pub sender: ClientId,
    pub kind: MessageKind,
    /// Opaque content, empty when the message carries none
    pub content: Vec<u8>,
}

impl MessageEnvelope {
    /// Wire form handed to the recipient
    pub fn into_pending(self) -> PendingMessage {
        PendingMessage {
            sender: self.sender,
            message_id: self.id,
            kind: self.kind,
            content: self.content,
        }
    }
}

struct StoreInner {
    queues: HashMap<ClientId, VecDeque<MessageEnvelope>>,
    next_id: u32,
}

/// Per-recipient FIFO queues of undelivered messages.
///
/// Id assignment and append happen under the same lock, so queue order and
/// id order always agree. A drain removes the whole queue in one step.
pub struct PendingStore {
    inner: Mutex<StoreInner>,
}

impl PendingStore {
    /// Create an empty store. The first message gets id 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                queues: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Append a message to the recipient's queue and return its id
    pub async fn enqueue(
        &self,
        recipient: ClientId,
        sender: ClientId,
        kind: MessageKind,
        content: Vec<u8>,
    ) -> Result<u32, StoreError> {
        let mut inner = self.inner.lock().await;

        let id = inner.next_id;
        inner.next_id = id.checked_add(1).ok_or(StoreError::IdsExhausted)?;

        inner
            .queues
            .entry(recipient)
            .or_default()
            .push_back(MessageEnvelope {
                id,
                recipient,
                sender,
                kind,
                content,
            });

        tracing::debug!(message_id = id, %recipient, %sender, %kind, "message queued");
        Ok(id)
    }

    /// Remove and return everything queued for the recipient, oldest first
    pub async fn drain_all(&self, recipient: ClientId) -> Vec<MessageEnvelope> {
        let mut inner = self.inner.lock().await;
        inner
            .queues
            .remove(&recipient)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of messages waiting for one recipient
    pub async fn pending_count(&self, recipient: ClientId) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.get(&recipient).map_or(0, VecDeque::len)
    }

    /// Number of undelivered messages across all recipients
    pub async fn total_pending(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.values().map(VecDeque::len).sum()
    }
}

impl Default for PendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(byte: u8) -> ClientId {
        ClientId::from_bytes([byte; 16])
    }

    #[tokio::test]
    async fn test_drain_is_fifo_and_destructive() {
        let store = PendingStore::new();
        let (alice, bob) = (id(1), id(2));

        store.enqueue(bob, alice, MessageKind::Text, b"one".to_vec()).await.unwrap();
        store.enqueue(bob, alice, MessageKind::Text, b"two".to_vec()).await.unwrap();
        store.enqueue(bob, alice, MessageKind::File, Vec::new()).await.unwrap();
        assert_eq!(store.pending_count(bob).await, 3);

        let drained = store.drain_all(bob).await;
        let contents: Vec<&[u8]> = drained.iter().map(|m| m.content.as_slice()).collect();
        assert_eq!(contents, vec![&b"one"[..], &b"two"[..], &b""[..]]);
        assert_eq!(drained[2].kind, MessageKind::File);

        assert!(store.drain_all(bob).await.is_empty());
        assert_eq!(store.pending_count(bob).await, 0);
    }

    #[tokio::test]
    async fn test_ids_increase_across_recipients() {
        let store = PendingStore::new();
        let sender = id(9);

        let mut last = 0;
        for i in 0..20u8 {
            let recipient = id(i % 3);
            let message_id = store
                .enqueue(recipient, sender, MessageKind::Text, vec![i])
                .await
                .unwrap();
            assert!(message_id > last);
            last = message_id;
        }
        assert_eq!(store.total_pending().await, 20);
    }

    #[tokio::test]
    async fn test_drain_leaves_other_recipients_alone() {
        let store = PendingStore::new();
        store.enqueue(id(1), id(3), MessageKind::Text, b"a".to_vec()).await.unwrap();
        store.enqueue(id(2), id(3), MessageKind::Text, b"b".to_vec()).await.unwrap();

        let drained = store.drain_all(id(1)).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].recipient, id(1));
        assert_eq!(store.pending_count(id(2)).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_drains_deliver_each_message_once() {
        let store = Arc::new(PendingStore::new());
        let recipient = id(1);

        let producer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200u32 {
                    store
                        .enqueue(recipient, id(2), MessageKind::Text, i.to_le_bytes().to_vec())
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut pollers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            pollers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.extend(store.drain_all(recipient).await.into_iter().map(|m| m.id));
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        producer.await.unwrap();
        let mut delivered = Vec::new();
        for poller in pollers {
            delivered.extend(poller.await.unwrap());
        }
        delivered.extend(store.drain_all(recipient).await.into_iter().map(|m| m.id));

        delivered.sort_unstable();
        let expected: Vec<u32> = (1..=200).collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn test_message_kind_codes() {
        for value in 1..=4 {
            assert_eq!(MessageKind::from_u8(value).unwrap().to_u8(), value);
        }
        assert!(MessageKind::from_u8(0).is_none());
        assert!(MessageKind::from_u8(5).is_none());
        assert_eq!(MessageKind::KeyDelivery.to_string(), "key-delivery");
    }
}
