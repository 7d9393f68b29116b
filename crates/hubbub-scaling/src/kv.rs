use async_nats::jetstream::kv;
use async_trait::async_trait;
use bytes::Bytes;
use hubbub_core::StoreError;

/// Current value of a key together with the revision it was written at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Bytes,
    pub revision: u64,
}

/// The slice of a revisioned key-value bucket the group store needs.
///
/// `create` and `update` are conditional: they fail with
/// [`StoreError::Conflict`] when the key already exists, or when its revision
/// no longer matches the one supplied.
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// Live value of `key`. Deleted or purged keys read as absent.
    async fn entry(&self, key: &str) -> Result<Option<KvEntry>, StoreError>;
    async fn create(&self, key: &str, value: Bytes) -> Result<u64, StoreError>;
    async fn update(&self, key: &str, value: Bytes, revision: u64) -> Result<u64, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl KvBucket for kv::Store {
    async fn entry(&self, key: &str) -> Result<Option<KvEntry>, StoreError> {
        let entry = kv::Store::entry(self, key.to_string())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(entry
            .filter(|e| matches!(e.operation, kv::Operation::Put))
            .map(|e| KvEntry {
                value: e.value,
                revision: e.revision,
            }))
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<u64, StoreError> {
        match kv::Store::create(self, key, value).await {
            Ok(revision) => Ok(revision),
            Err(e) if matches!(e.kind(), kv::CreateErrorKind::AlreadyExists) => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn update(&self, key: &str, value: Bytes, revision: u64) -> Result<u64, StoreError> {
        match kv::Store::update(self, key, value, revision).await {
            Ok(revision) => Ok(revision),
            Err(e) if matches!(e.kind(), kv::UpdateErrorKind::WrongLastRevision) => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        kv::Store::delete(self, key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
