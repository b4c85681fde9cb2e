use std::{collections::HashMap, sync::Arc};

use crate::{
    db::{DbPool, DbResult},
    models::{OrphanEnrichment, OrphanNumbers, OrphanNumbersFilter, OrphanReportRow, PhoneNumber},
    phone::normalize_phone_number,
};

const ENRICH_PAGE_SIZE: i64 = 1000;

#[derive(Clone)]
pub struct OrphanService {
    db: Arc<DbPool>,
}

impl OrphanService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Re-normalize orphan numbers and fill missing provider, country and
    /// operator from the matching pool number. Returns rows updated.
    pub async fn enrich(&self) -> DbResult<u64> {
        let orphans = self.db.orphans();
        let phone_numbers = self.db.phone_numbers();

        let mut after_id = 0;
        let mut processed = 0u64;
        let mut updated = 0u64;
        loop {
            let page = orphans.list_unenriched(after_id, ENRICH_PAGE_SIZE).await?;
            let Some(last) = page.last() else { break };
            after_id = last.id;
            processed += page.len() as u64;

            let mut lookups: HashMap<String, Option<PhoneNumber>> = HashMap::new();
            let mut updates = Vec::new();
            for orphan in &page {
                let normalized = normalize_phone_number(&orphan.phone_number);
                let number = if normalized.is_empty() {
                    orphan.phone_number.clone()
                } else {
                    normalized
                };

                if !lookups.contains_key(&number) {
                    let row = phone_numbers.get_by_number(&number).await?;
                    lookups.insert(number.clone(), row);
                }
                let row = lookups.get(&number).and_then(Option::as_ref);

                let enrichment = OrphanEnrichment {
                    id: orphan.id,
                    provider_id: orphan.provider_id.or(row.map(|r| r.provider_id)),
                    country_id: orphan.country_id.or(row.map(|r| r.country_id)),
                    operator_id: orphan.operator_id.or(row.and_then(|r| r.operator_id)),
                    phone_number: number,
                };
                let changed = enrichment.phone_number != orphan.phone_number
                    || enrichment.provider_id != orphan.provider_id
                    || enrichment.country_id != orphan.country_id
                    || enrichment.operator_id != orphan.operator_id;
                if changed {
                    updates.push(enrichment);
                }
            }

            if !updates.is_empty() {
                updated += orphans.apply_enrichment(&updates).await?;
            }
        }

        tracing::info!(processed, updated, "Orphan enrichment finished");
        Ok(updated)
    }

    pub async fn report(&self, limit: i64) -> DbResult<Vec<OrphanReportRow>> {
        self.db.orphans().report(limit.clamp(1, 10_000)).await
    }

    /// Distinct numbers that got orphans from `filter.source_addr`.
    pub async fn numbers(&self, filter: &OrphanNumbersFilter) -> DbResult<OrphanNumbers> {
        let numbers = self.db.orphans().numbers_for_source(filter).await?;

        let catalog = self.db.catalog();
        let provider_name = match filter.provider_id {
            Some(id) => catalog
                .list_providers()
                .await?
                .into_iter()
                .find(|p| p.id == id)
                .map(|p| p.name),
            None => None,
        };
        let country_name = match filter.country_id {
            Some(id) => catalog
                .list_countries()
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .map(|c| c.name),
            None => None,
        };
        let operator_name = match filter.operator_id {
            Some(id) => catalog
                .list_operators(filter.country_id)
                .await?
                .into_iter()
                .find(|o| o.id == id)
                .map(|o| o.name),
            None => None,
        };

        Ok(OrphanNumbers {
            source_addr: filter.source_addr.clone(),
            provider_name,
            country_name,
            operator_name,
            numbers,
        })
    }
}
