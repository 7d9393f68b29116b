use std::sync::Arc;

use async_nats::jetstream;
use hubbub_core::Backends;
use hubbub_settings::{ScalingMode, ScalingSettings};
use hubbub_telemetry::MetricsRecorder;
use tracing::info;

use crate::bucket::open_bucket;
use crate::error::ScalingError;
use crate::groups::NatsGroups;
use crate::relay::NatsRelayer;

pub async fn connect(address: &str) -> Result<async_nats::Client, ScalingError> {
    let client = async_nats::connect(address)
        .await
        .map_err(|e| ScalingError::Connect(format!("{address}: {e}")))?;
    info!(address, "connected to nats");
    Ok(client)
}

/// Build the group store and relayer for the configured mode.
///
/// - `SINGLETON`: in-memory store and relayer.
/// - `COLOCATED`: JetStream KV store and pub/sub relayer sharing one client.
/// - `DISTRIBUTED`: not implemented, always an error.
pub async fn select_backends(
    settings: &ScalingSettings,
    metrics: Arc<MetricsRecorder>,
) -> Result<Backends, ScalingError> {
    match settings.mode {
        ScalingMode::Singleton => {
            info!(mode = %settings.mode, "using in-memory backends");
            Ok(Backends::in_memory())
        }
        ScalingMode::Colocated => {
            let nats = &settings.nats;
            let client = connect(&nats.address).await?;
            let js = jetstream::new(client.clone());
            let store = open_bucket(&js, &nats.group_bucket).await?;
            let groups = NatsGroups::new(store).with_metrics(metrics);
            let relayer = NatsRelayer::subscribe(client, nats.relay_subject.clone()).await?;
            info!(
                mode = %settings.mode,
                bucket = %nats.group_bucket,
                subject = %nats.relay_subject,
                "using nats backends"
            );
            Ok(Backends::new(Arc::new(groups), Arc::new(relayer)))
        }
        ScalingMode::Distributed => Err(ScalingError::Unsupported(settings.mode)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubbub_core::{Event, RelayMessage};
    use hubbub_settings::NatsSettings;

    #[tokio::test]
    async fn singleton_uses_in_memory_backends() {
        let settings = ScalingSettings::default();
        let backends = select_backends(&settings, Arc::new(MetricsRecorder::new()))
            .await
            .unwrap();
        backends.groups.add_to_group("a", "g1").await.unwrap();
        assert_eq!(backends.groups.group_members("g1").await.unwrap(), vec!["a".to_string()]);
        backends
            .relayer
            .broadcast(RelayMessage::to_all(Event::default()))
            .await
            .unwrap();
        assert_eq!(backends.relayer.receive_broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn distributed_fails_fast() {
        let settings = ScalingSettings {
            mode: ScalingMode::Distributed,
            ..Default::default()
        };
        let err = select_backends(&settings, Arc::new(MetricsRecorder::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScalingError::Unsupported(ScalingMode::Distributed)));
    }

    #[tokio::test]
    async fn colocated_without_nats_is_a_connect_error() {
        let settings = ScalingSettings {
            mode: ScalingMode::Colocated,
            nats: NatsSettings {
                address: "nats://127.0.0.1:1".into(),
                ..Default::default()
            },
        };
        let err = select_backends(&settings, Arc::new(MetricsRecorder::new()))
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), "connect");
    }
}
