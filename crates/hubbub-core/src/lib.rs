pub mod backends;
pub mod engine;
pub mod errors;
pub mod events;
pub mod groups;
pub mod ids;
pub mod relay;

pub use backends::Backends;
pub use engine::Engine;
pub use errors::{EventError, RelayError, StoreError};
pub use events::{Event, Target};
pub use groups::{GroupStore, InMemoryGroups, MembershipChange};
pub use ids::ConnectionId;
pub use relay::{InMemoryRelayer, RelayMessage, Relayer};
