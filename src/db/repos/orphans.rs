use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{NewOrphanSms, OrphanEnrichment, OrphanNumbersFilter, OrphanReportRow, OrphanSms},
};

#[async_trait]
pub trait OrphanRepo: Send + Sync {
    async fn create(&self, input: NewOrphanSms) -> DbResult<OrphanSms>;

    /// Orphans missing a provider, country or operator, ordered by id,
    /// starting after `after_id`.
    async fn list_unenriched(&self, after_id: i64, limit: i64) -> DbResult<Vec<OrphanSms>>;

    /// Write back normalized numbers and filled references.
    async fn apply_enrichment(&self, updates: &[OrphanEnrichment]) -> DbResult<u64>;

    /// Orphans grouped by (number, source), most frequent first.
    async fn report(&self, limit: i64) -> DbResult<Vec<OrphanReportRow>>;

    /// Distinct numbers that received orphans from one sender. Provider,
    /// country and operator match the orphan's own value, else the pool
    /// number's.
    async fn numbers_for_source(&self, filter: &OrphanNumbersFilter) -> DbResult<Vec<String>>;
}
