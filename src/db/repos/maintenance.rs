use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::error::DbResult;

/// Tables tuned, pruned and reindexed by maintenance.
pub const MAINTAINED_TABLES: [&str; 4] = ["phone_numbers", "sessions", "sms_messages", "orphan_sms"];

/// Data removed by pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PruneTarget {
    /// `sms_messages` by `received_at`.
    SmsMessages,
    /// `orphan_sms` by `received_at`.
    OrphanSms,
    /// Finished and cancelled `sessions` by `created_at`, with their messages.
    ClosedSessions,
}

impl PruneTarget {
    pub const ALL: [PruneTarget; 3] = [
        PruneTarget::SmsMessages,
        PruneTarget::OrphanSms,
        PruneTarget::ClosedSessions,
    ];

    pub fn table(self) -> &'static str {
        match self {
            PruneTarget::SmsMessages => "sms_messages",
            PruneTarget::OrphanSms => "orphan_sms",
            PruneTarget::ClosedSessions => "sessions",
        }
    }
}

/// How a batched delete is paced and capped.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub batch_size: u32,
    /// Stop after this many rows. `u64::MAX` for unlimited.
    pub max_deletes: u64,
    /// Sleep between batches.
    pub pause: Duration,
}

#[async_trait]
pub trait MaintenanceRepo: Send + Sync {
    /// Delete rows of `target` older than `cutoff` in batches.
    async fn delete_before(
        &self,
        target: PruneTarget,
        cutoff: DateTime<Utc>,
        limits: BatchLimits,
    ) -> DbResult<u64>;

    /// Rows `delete_before` would remove.
    async fn count_before(&self, target: PruneTarget, cutoff: DateTime<Utc>) -> DbResult<i64>;

    /// Refresh planner statistics for the given tables.
    async fn analyze(&self, tables: &[&str]) -> DbResult<()>;

    /// Storage parameters and server-side helpers.
    async fn setup(&self) -> DbResult<()>;

    /// Rebuild indexes of the maintained tables.
    async fn reindex(&self) -> DbResult<()>;
}
