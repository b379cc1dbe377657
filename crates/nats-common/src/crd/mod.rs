//! Custom Resource Definitions for the NATS manager

mod nats;
mod status;
mod types;

pub use nats::{
    is_valid_quantity, ClusterSpec, FileStorageSpec, JetStreamSpec, LoggingSpec, MemStorageSpec,
    Nats, NatsSpec, ResourceQuantities, ResourcesSpec,
};
pub use status::{NatsStatus, ZoneSpread};
pub use types::{condition_reasons, condition_types, Condition, ConditionStatus, NatsState};
