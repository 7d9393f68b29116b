use std::time::Duration;

use async_nats::jetstream::{self, kv, stream::StorageType};
use hubbub_settings::NatsSettings;
use tracing::info;

use crate::error::ScalingError;

const BUCKET_DESCRIPTION: &str = "hubbub group membership";

/// Outcome of [`provision_bucket`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketStatus {
    Existing,
    Created,
}

/// Key-value configuration used when provisioning the group bucket.
pub fn bucket_config(settings: &NatsSettings) -> kv::Config {
    kv::Config {
        bucket: settings.group_bucket.clone(),
        description: BUCKET_DESCRIPTION.to_string(),
        history: settings.bucket_history,
        max_age: Duration::from_secs(settings.bucket_ttl_hours * 3600),
        storage: StorageType::Memory,
        ..Default::default()
    }
}

/// Open an existing group bucket. Hubs never create it on their own; run
/// `hubbub init-bucket` first.
pub async fn open_bucket(js: &jetstream::Context, name: &str) -> Result<kv::Store, ScalingError> {
    js.get_key_value(name)
        .await
        .map_err(|e| ScalingError::KeyValue(format!("{name}: {e} (run `hubbub init-bucket`)")))
}

/// Create the group bucket unless it already exists.
pub async fn provision_bucket(
    client: async_nats::Client,
    settings: &NatsSettings,
) -> Result<BucketStatus, ScalingError> {
    let js = jetstream::new(client);
    if js.get_key_value(&settings.group_bucket).await.is_ok() {
        info!(bucket = %settings.group_bucket, "jetstream bucket already exists");
        return Ok(BucketStatus::Existing);
    }

    info!(bucket = %settings.group_bucket, "creating jetstream bucket");
    js.create_key_value(bucket_config(settings))
        .await
        .map_err(|e| ScalingError::KeyValue(e.to_string()))?;
    info!(bucket = %settings.group_bucket, "created jetstream bucket");
    Ok(BucketStatus::Created)
}
