//! Data retention: deletion of old messages, orphans and closed sessions.
//!
//! [`prune`] performs one batched pass. It backs both the background worker
//! started by `serve` and `smsgate maintenance --prune`.

mod prune;
mod worker;

pub use prune::{PruneResult, prune};
pub use worker::start_retention_worker;
