use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    db::{DbPool, DbResult},
    models::{ApiKeyStats, ServiceBreakdown, StatsPeriod},
};

/// Received-message statistics per reseller key.
#[derive(Clone)]
pub struct StatsService {
    db: Arc<DbPool>,
}

impl StatsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Messages per service for every active key, or only `api_key_id`.
    /// Services are ordered by count, most messages first.
    pub async fn api_key_stats(
        &self,
        period: StatsPeriod,
        api_key_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<ApiKeyStats>> {
        let (start, end) = period.bounds(now);
        let counts = self
            .db
            .sessions()
            .sms_counts_by_service(start, end, api_key_id)
            .await?;

        let mut by_key: BTreeMap<i64, Vec<ServiceBreakdown>> = BTreeMap::new();
        for row in counts {
            by_key.entry(row.api_key_id).or_default().push(ServiceBreakdown {
                name: row.service_name,
                count: row.count,
            });
        }

        let keys = self.db.api_keys().list().await?;
        let stats = keys
            .into_iter()
            .filter(|k| match api_key_id {
                Some(id) => k.id == id,
                None => k.is_active,
            })
            .map(|key| {
                let mut services = by_key.remove(&key.id).unwrap_or_default();
                services.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
                ApiKeyStats {
                    api_key_id: key.id,
                    key_prefix: key.key_prefix,
                    description: key.description,
                    total_sms: services.iter().map(|s| s.count).sum(),
                    services,
                }
            })
            .collect();
        Ok(stats)
    }
}
