//! Shared types for the porcupin backup engine: the domain model, the
//! URI→cid canonicalization rule, the shared error kind, and the tuning
//! constants the rest of the workspace reads from.

pub mod cid;
pub mod constants;
pub mod domain;
pub mod error;

pub use cid::{extract_cid, is_ipfs_uri};
pub use domain::{Account, AssetRole, PinIntent, PinStatus, Setting, Token};
pub use error::PorcupinError;
