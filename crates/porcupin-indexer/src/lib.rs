//! Adapter to the external token indexer: paginated REST listings, on-chain
//! metadata URI resolution, a realtime push channel, and the pre-filter
//! that keeps obvious non-NFTs out of the pin manager's hands.

pub mod client;
pub mod filters;
pub mod model;
pub mod realtime;

pub use client::{Indexer, IndexerClient};
pub use filters::passes_prefilter;
pub use model::{RealtimeEvent, TokenDto, TokenPage};
pub use realtime::{RealtimeHandle, RealtimeSubscriber};
