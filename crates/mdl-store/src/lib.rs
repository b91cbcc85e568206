//! World-state storage for MedLedger replicas.
//!
//! Each replica owns one [`WorldState`]: the current key → value snapshot of
//! every asset. Keys are asset ids in a flat namespace; values are canonical
//! JSON encodings produced by the asset contract.
//!
//! # Design Rules
//!
//! 1. Existence is binary: a key is present with a non-empty value or absent.
//! 2. Scans are ordered by key bytes and observe one consistent snapshot.
//! 3. Batches apply atomically; readers never see half a transition.
//! 4. The store never interprets values.
//! 5. All failures are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryWorldState;
pub use traits::{StateWrite, WorldState};
