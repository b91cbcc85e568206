//! Built-in admission stages.

pub mod eviction;
pub mod schema;

pub use eviction::EvictionPolicyStage;
pub use schema::SchemaStage;
