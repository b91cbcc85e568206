//! Canonical encoding and hashing for MedLedger.
//!
//! Replicas independently re-execute every transition and must derive
//! byte-identical writes. This crate provides the canonical JSON encoder that
//! all world-state writes go through, and the domain-separated BLAKE3 hasher
//! used to compare write sets and world-state snapshots across replicas.

pub mod canonical;
pub mod hasher;

pub use canonical::{encode, to_canonical_string, to_canonical_vec, CanonicalError};
pub use hasher::{ContentHasher, Digest};
