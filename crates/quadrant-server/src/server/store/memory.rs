//! In-process [`DocumentStore`] keyed by ULID.
//!
//! Ids are ULIDs encoded as 26-character Crockford base32. Keys issued within
//! the same millisecond are bumped past the previous one, so the listing
//! order is creation order.

use super::DocumentStore;
use ferroid::{base32::Base32UlidExt, id::ULID};
use parking_lot::RwLock;
use quadrant_core::{Fault, Result, proto::Blog, stream::FaultStream};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Documents>,
}

#[derive(Default)]
struct Documents {
    by_id: BTreeMap<u128, Blog>,
    last_issued: u128,
}

impl Documents {
    fn issue_key(&mut self) -> u128 {
        let now = ULID::now().to_raw();
        self.last_issued = if now > self.last_issued {
            now
        } else {
            self.last_issued.saturating_add(1)
        };
        self.last_issued
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_id(raw: &str) -> Result<u128> {
    ULID::decode(raw)
        .map(|id| id.to_raw())
        .map_err(|_| Fault::invalid_argument(format!("Cannot parse ID `{raw}`")))
}

fn encode_id(raw: u128) -> String {
    ULID::from_raw(raw).encode().to_string()
}

fn missing(id: &str) -> Fault {
    Fault::not_found(format!("Cannot find blog with id {id}"))
}

#[tonic::async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, blog: Blog) -> Result<Blog> {
        let mut documents = self.inner.write();
        let key = documents.issue_key();
        let blog = Blog {
            id: encode_id(key),
            ..blog
        };
        documents.by_id.insert(key, blog.clone());
        #[cfg(feature = "tracing")]
        tracing::debug!(id = %blog.id, "Blog created");
        Ok(blog)
    }

    async fn read(&self, id: &str) -> Result<Blog> {
        let key = parse_id(id)?;
        self.inner
            .read()
            .by_id
            .get(&key)
            .cloned()
            .ok_or_else(|| missing(id))
    }

    async fn update(&self, blog: Blog) -> Result<Blog> {
        let key = parse_id(&blog.id)?;
        let mut documents = self.inner.write();
        let stored = documents.by_id.get_mut(&key).ok_or_else(|| missing(&blog.id))?;

        *stored = Blog {
            id: encode_id(key),
            ..blog
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: &str) -> Result<String> {
        let key = parse_id(id)?;
        self.inner
            .write()
            .by_id
            .remove(&key)
            .map(|removed| removed.id)
            .ok_or_else(|| missing(id))
    }

    async fn list(&self) -> Result<FaultStream<Blog>> {
        let snapshot: Vec<Blog> = self.inner.read().by_id.values().cloned().collect();
        Ok(Box::pin(futures::stream::iter(snapshot.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn draft(title: &str) -> Blog {
        Blog {
            id: String::new(),
            author_id: "ada".to_string(),
            title: title.to_string(),
            content: "notes".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_read_returns_same_document() {
        let store = MemoryStore::new();
        let created = store.create(draft("first")).await.unwrap();
        assert_eq!(created.id.len(), 26);

        let read = store.read(&created.id).await.unwrap();
        assert_eq!(read, created);
        assert_eq!(Blog { id: String::new(), ..read }, draft("first"));
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let store = MemoryStore::new();
        let created = store.create(draft("gone")).await.unwrap();

        assert_eq!(store.delete(&created.id).await.unwrap(), created.id);
        assert!(matches!(
            store.read(&created.id).await,
            Err(Fault::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(&created.id).await,
            Err(Fault::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_ids_are_invalid_arguments() {
        let store = MemoryStore::new();
        for id in ["", "not-an-id", "0123"] {
            assert!(matches!(
                store.read(id).await,
                Err(Fault::InvalidArgument { .. })
            ));
        }
    }

    #[tokio::test]
    async fn update_replaces_fields_but_keeps_id() {
        let store = MemoryStore::new();
        let created = store.create(draft("draft")).await.unwrap();

        let updated = store
            .update(Blog {
                title: "final".to_string(),
                ..created.clone()
            })
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "final");
        assert_eq!(store.read(&created.id).await.unwrap(), updated);

        let unknown = Blog {
            id: encode_id(created.id.len() as u128),
            ..draft("ghost")
        };
        assert!(matches!(
            store.update(unknown).await,
            Err(Fault::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_follows_creation_order() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            ids.push(store.create(draft(title)).await.unwrap().id);
        }

        let listed: Vec<String> = store
            .list()
            .await
            .unwrap()
            .map(|blog| blog.unwrap().id)
            .collect()
            .await;
        assert_eq!(listed, ids);
    }
}
