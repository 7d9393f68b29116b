use std::sync::Arc;

use async_nats::jetstream::kv;
use async_trait::async_trait;
use bytes::Bytes;
use hubbub_core::{GroupStore, MembershipChange, StoreError};
use hubbub_telemetry::MetricsRecorder;
use tracing::{debug, trace};

use crate::kv::KvBucket;

const EMPTY_MEMBERS: &[u8] = b"[]";

/// Group store over a revisioned key-value bucket.
///
/// Each group is one key holding a JSON array of member ids. Mutations run a
/// read-modify-write loop with a conditional update on the read revision, so
/// any number of processes can share the bucket without locks.
pub struct KvGroups<B> {
    bucket: B,
    metrics: Option<Arc<MetricsRecorder>>,
}

/// Group store backed by a JetStream key-value bucket.
pub type NatsGroups = KvGroups<kv::Store>;

impl<B: KvBucket> KvGroups<B> {
    pub fn new(bucket: B) -> Self {
        Self {
            bucket,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bucket(&self) -> &B {
        &self.bucket
    }

    /// Members and revision of `group_id`, creating an empty record if the
    /// group does not exist yet.
    async fn read_or_create(&self, group_id: &str) -> Result<(Vec<String>, u64), StoreError> {
        loop {
            if let Some(entry) = self.bucket.entry(group_id).await? {
                let members: Vec<String> = serde_json::from_slice(&entry.value)?;
                return Ok((members, entry.revision));
            }
            match self
                .bucket
                .create(group_id, Bytes::from_static(EMPTY_MEMBERS))
                .await
            {
                Ok(revision) => return Ok((Vec::new(), revision)),
                // Another writer created it between our read and create.
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn modify(
        &self,
        conn_id: &str,
        group_id: &str,
        change: MembershipChange,
    ) -> Result<(), StoreError> {
        let mut retries = 0u32;
        loop {
            let (mut members, revision) = self.read_or_create(group_id).await?;
            if !change.apply(&mut members, conn_id) {
                trace!(conn_id, group_id, ?change, "membership unchanged");
                return Ok(());
            }
            let value = Bytes::from(serde_json::to_vec(&members)?);
            match self.bucket.update(group_id, value, revision).await {
                Ok(_) => {
                    debug!(conn_id, group_id, ?change, retries, members = members.len(), "group updated");
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => {
                    retries += 1;
                    trace!(conn_id, group_id, revision, retries, "revision conflict, retrying");
                    if let Some(ref metrics) = self.metrics {
                        metrics.counter_inc("hub.groups.cas_retries", &[], 1);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<B: KvBucket> GroupStore for KvGroups<B> {
    async fn add_to_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError> {
        self.modify(conn_id, group_id, MembershipChange::Add).await
    }

    async fn remove_from_group(&self, conn_id: &str, group_id: &str) -> Result<(), StoreError> {
        self.modify(conn_id, group_id, MembershipChange::Remove).await
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        match self.bucket.entry(group_id).await? {
            Some(entry) => Ok(serde_json::from_slice(&entry.value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        self.bucket.delete(group_id).await
    }
}
