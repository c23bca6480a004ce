//! The embedded persistence layer: schema management, row mapping and the
//! `StoreHandle` API the rest of the workspace talks to.

mod rows;
mod schema;
mod store;

pub use store::StoreHandle;
