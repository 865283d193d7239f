//! Durable run state: manifest and digest table persistence, and
//! standalone verification against them.

pub mod store;
pub mod verify;

pub use store::{load_digest_table, persist_run};
pub use verify::{verify, VerifyReport};
