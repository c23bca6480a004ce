//! The contract the core requires of the content-addressed blob-storage
//! node, plus a reference HTTP implementation over Kubo's RPC API and an
//! in-memory double for tests.

pub mod kubo;
pub mod memory;
pub mod store;

pub use kubo::KuboHttpBlobStore;
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
