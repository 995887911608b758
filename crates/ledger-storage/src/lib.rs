//! Durable [`ChainStore`](ledger_core::ChainStore) backends.
//!
//! - [`file_store::FileStore`]: one append-only text file per node, records
//!   separated by a fixed delimiter. Lookups are positional, so reads cost
//!   time linear in the file size.
//! - [`sled_store::SledStore`]: blocks keyed by number in an embedded sled tree.

pub mod file_store;
pub mod sled_store;

pub use file_store::FileStore;
pub use sled_store::SledStore;
