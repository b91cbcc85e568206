//! Asset ledger contract for MedLedger.
//!
//! This crate provides:
//! - [`AssetContract`]: deterministic create/read/update/transfer/delete and
//!   full-scan transitions over a replica's world state
//! - [`OperationRegistry`]: the dispatch table from operation name to
//!   transition, bound to each operation's parameter schema
//! - [`ReplicaSet`]: endorsement on every replica, write-set agreement, and
//!   serialized commit
//! - [`ContractHandle`]: a tenant's fixed view of the ledger
//! - [`ReplayEngine`]: re-execution of the commit history from genesis

pub mod context;
pub mod contract;
pub mod error;
pub mod handle;
pub mod network;
pub mod registry;
pub mod replay;
pub mod replica;

pub use context::{TxContext, WriteSet};
pub use contract::{AssetContract, ScanEntry};
pub use error::{ContractError, ContractResult};
pub use handle::ContractHandle;
pub use network::{CommittedTx, ReplicaSet, TxReceipt};
pub use registry::{Handler, OperationRegistry, Registration, TxPayload};
pub use replay::{ReplayEngine, ReplayResult};
pub use replica::{Endorsement, Replica};
