//! In-memory credential store

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::debug;

use super::{ClientRecord, CredentialStore, StoreError, StoreFuture};

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: RwLock<HashMap<String, ClientRecord>>,
    revoked: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of revoked token strings.
    pub async fn revoked_count(&self) -> usize {
        self.revoked.read().await.len()
    }
}

impl CredentialStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn find_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<ClientRecord>> {
        Box::pin(async move { Ok(self.clients.read().await.get(client_id).cloned()) })
    }

    fn insert_client(&self, client: ClientRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut clients = self.clients.write().await;
            if clients.contains_key(&client.client_id) {
                return Err(StoreError::Conflict);
            }
            debug!(client_id = client.client_id, "inserted client");
            clients.insert(client.client_id.clone(), client);
            Ok(())
        })
    }

    fn insert_revocation<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.revoked.write().await.insert(token.to_owned());
            Ok(())
        })
    }

    fn is_revoked<'a>(&'a self, token: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.revoked.read().await.contains(token)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(id: &str, is_admin: bool) -> ClientRecord {
        ClientRecord {
            client_id: id.into(),
            secret_digest: crate::hasher::digest("secret"),
            is_admin,
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = MemoryStore::new();
        store.insert_client(record("svc1", true)).await.unwrap();

        let found = store.find_client("svc1").await.unwrap().unwrap();
        assert_eq!(found, record("svc1", true));
        assert!(store.find_client("svc2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_client_conflicts_and_keeps_original() {
        let store = MemoryStore::new();
        store.insert_client(record("svc1", false)).await.unwrap();

        let result = store.insert_client(record("svc1", true)).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        let found = store.find_client("svc1").await.unwrap().unwrap();
        assert!(!found.is_admin, "conflicting insert must not overwrite");
        assert_eq!(store.client_count().await, 1);
    }

    #[tokio::test]
    async fn revocation_is_idempotent() {
        let store = MemoryStore::new();
        assert!(!store.is_revoked("tok").await.unwrap());

        store.insert_revocation("tok").await.unwrap();
        store.insert_revocation("tok").await.unwrap();

        assert!(store.is_revoked("tok").await.unwrap());
        assert!(!store.is_revoked("other").await.unwrap());
        assert_eq!(store.revoked_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_revocations_all_succeed() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = vec![];
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_revocation("same-token").await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(store.is_revoked("same-token").await.unwrap());
        assert_eq!(store.revoked_count().await, 1);
    }
}
