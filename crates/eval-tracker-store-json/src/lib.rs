#![allow(clippy::missing_errors_doc)]

//! JSON file persistence for evaluation requests and login sessions.
//!
//! Every document is written through [`atomic::write_json_atomic`]: the bytes
//! land in a unique temp file next to the destination, are synced, and are
//! renamed over the target.

pub mod atomic;
mod requests;
mod sessions;

pub use requests::{IndexCheck, JsonRequestStore, PruneReport, RequestIndex};
pub use sessions::{JsonSessionStore, SweepReport, VERIFIER_TTL_MINUTES};
