//! # hubbub-scaling
//!
//! Backends for running several hub processes against one NATS cluster:
//! a JetStream key-value group store with compare-and-swap updates and a
//! pub/sub relayer. [`select_backends`] maps the configured
//! [`ScalingMode`](hubbub_settings::ScalingMode) to a
//! [`Backends`](hubbub_core::Backends) pair.

pub mod bucket;
pub mod error;
pub mod groups;
pub mod kv;
pub mod relay;
pub mod selector;

pub use bucket::{bucket_config, open_bucket, provision_bucket, BucketStatus};
pub use error::ScalingError;
pub use groups::{KvGroups, NatsGroups};
pub use kv::{KvBucket, KvEntry};
pub use relay::{NatsRelayer, RelayBuffer};
pub use selector::{connect, select_backends};
