use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use rand::Rng;

use crate::{
    db::{DbError, DbPool, DbResult},
    models::{GenerateNumbers, GenerateSummary, ImportSummary, NewPhoneNumber, PhoneNumberFilter},
    phone::normalize_phone_number,
};

/// Numbers looked up and inserted per statement.
pub const IMPORT_BATCH_SIZE: usize = 5000;

/// Generation gives up after `quantity` times this many candidates.
const GENERATE_ATTEMPTS_PER_NUMBER: u64 = 20;

/// Where imported or generated numbers are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberOrigin {
    pub provider_id: i64,
    pub country_id: i64,
    pub operator_id: Option<i64>,
}

/// Number pool administration.
#[derive(Clone)]
pub struct NumberService {
    db: Arc<DbPool>,
}

impl NumberService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Import one number per line. Blank lines are ignored, lines without
    /// digits count as invalid, and numbers already in the pool are skipped.
    pub async fn import(&self, content: &str, origin: NumberOrigin) -> DbResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut candidates = BTreeSet::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let number = normalize_phone_number(line);
            if number.is_empty() {
                summary.invalid += 1;
            } else {
                candidates.insert(number);
            }
        }

        let candidates: Vec<String> = candidates.into_iter().collect();
        for batch in candidates.chunks(IMPORT_BATCH_SIZE) {
            let (added, skipped) = self.insert_new(batch, origin).await?;
            summary.added += added;
            summary.skipped += skipped;
        }

        tracing::info!(
            added = summary.added,
            skipped = summary.skipped,
            invalid = summary.invalid,
            "Numbers imported"
        );
        Ok(summary)
    }

    /// Fill each `X` of the mask with a random digit until `quantity` new
    /// numbers are added or the attempt budget runs out.
    pub async fn generate(&self, input: &GenerateNumbers) -> DbResult<GenerateSummary> {
        let mask = input.mask.trim();
        validate_mask(mask)?;

        let origin = NumberOrigin {
            provider_id: input.provider_id,
            country_id: input.country_id,
            operator_id: input.operator_id,
        };
        let quantity = u64::from(input.quantity);
        let max_attempts = quantity.saturating_mul(GENERATE_ATTEMPTS_PER_NUMBER);

        let mut seen = HashSet::new();
        let mut attempts = 0u64;
        let mut added = 0u64;
        while added < quantity && attempts < max_attempts {
            let want = (quantity - added).min(IMPORT_BATCH_SIZE as u64) as usize;
            let mut batch = Vec::with_capacity(want);
            while batch.len() < want && attempts < max_attempts {
                attempts += 1;
                let number = normalize_phone_number(&fill_mask(mask));
                if seen.insert(number.clone()) {
                    batch.push(number);
                }
            }
            if batch.is_empty() {
                break;
            }
            let (inserted, _) = self.insert_new(&batch, origin).await?;
            added += inserted;
        }

        if added < quantity {
            tracing::warn!(
                mask,
                requested = quantity,
                added,
                attempts,
                "Mask exhausted before reaching the requested quantity"
            );
        } else {
            tracing::info!(mask, added, "Numbers generated");
        }
        Ok(GenerateSummary {
            added,
            requested: quantity,
        })
    }

    /// Delete numbers matching the filter. An empty filter is rejected.
    pub async fn delete(&self, filter: &PhoneNumberFilter) -> DbResult<u64> {
        if filter.is_empty() {
            return Err(DbError::Validation(
                "at least one of provider_id, country_id or is_in_use is required".into(),
            ));
        }
        let deleted = self.db.phone_numbers().delete_matching(filter).await?;
        tracing::info!(deleted, ?filter, "Numbers deleted");
        Ok(deleted)
    }

    pub async fn shuffle(&self) -> DbResult<u64> {
        let updated = self.db.phone_numbers().shuffle().await?;
        tracing::info!(updated, "Number order shuffled");
        Ok(updated)
    }

    /// Insert the numbers of `batch` not yet in the pool. Returns (added, skipped).
    async fn insert_new(&self, batch: &[String], origin: NumberOrigin) -> DbResult<(u64, u64)> {
        let repo = self.db.phone_numbers();
        let existing: HashSet<String> = repo.existing_numbers(batch).await?.into_iter().collect();
        let new: Vec<NewPhoneNumber> = batch
            .iter()
            .filter(|n| !existing.contains(*n))
            .map(|n| NewPhoneNumber {
                number: n.clone(),
                provider_id: origin.provider_id,
                country_id: origin.country_id,
                operator_id: origin.operator_id,
            })
            .collect();
        let added = if new.is_empty() {
            0
        } else {
            repo.insert_many(&new).await?
        };
        Ok((added, batch.len() as u64 - added))
    }
}

pub(super) fn validate_mask(mask: &str) -> DbResult<()> {
    let mut placeholders = 0;
    for c in mask.chars() {
        match c {
            'X' | 'x' => placeholders += 1,
            '+' | '0'..='9' => {}
            other => {
                return Err(DbError::Validation(format!(
                    "mask may only contain digits and X, found '{other}'"
                )));
            }
        }
    }
    if placeholders == 0 {
        return Err(DbError::Validation("mask has no X placeholders".into()));
    }
    Ok(())
}

pub(super) fn fill_mask(mask: &str) -> String {
    let mut rng = rand::thread_rng();
    mask.chars()
        .map(|c| match c {
            'X' | 'x' => char::from(b'0' + rng.gen_range(0..10u8)),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::harness::{Fixture, numbers, seed_fixture, sqlite_db};

    async fn setup() -> (Arc<DbPool>, NumberService, Fixture) {
        let db = sqlite_db().await;
        let fixture = seed_fixture(&db).await;
        let db = Arc::new(db);
        (db.clone(), NumberService::new(db), fixture)
    }

    fn origin(fixture: &Fixture) -> NumberOrigin {
        NumberOrigin {
            provider_id: fixture.provider_id,
            country_id: fixture.country_id,
            operator_id: None,
        }
    }

    #[tokio::test]
    async fn test_import_normalizes_and_skips_existing() {
        let (db, service, fixture) = setup().await;
        db.phone_numbers()
            .insert_many(&numbers(&fixture, &["+79990000001"]))
            .await
            .unwrap();

        let content = "89990000001\n+7 999 000-00-02\n\n9990000002\nn/a\n79990000003\r\n";
        let summary = service.import(content, origin(&fixture)).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                added: 2,
                skipped: 1,
                invalid: 1,
            }
        );
        assert!(
            db.phone_numbers()
                .get_by_number("+79990000002")
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(db.phone_numbers().count_available(fixture.country_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_generate_from_mask() {
        let (db, service, fixture) = setup().await;
        let summary = service
            .generate(&GenerateNumbers {
                mask: "7999000XX".into(),
                quantity: 20,
                provider_id: fixture.provider_id,
                country_id: fixture.country_id,
                operator_id: None,
            })
            .await
            .unwrap();
        assert_eq!(summary.requested, 20);
        assert_eq!(summary.added, 20);
        assert_eq!(db.phone_numbers().count_available(fixture.country_id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_generate_stops_when_mask_is_exhausted() {
        let (_db, service, fixture) = setup().await;
        let summary = service
            .generate(&GenerateNumbers {
                mask: "79990000X".into(),
                quantity: 50,
                provider_id: fixture.provider_id,
                country_id: fixture.country_id,
                operator_id: None,
            })
            .await
            .unwrap();
        assert!(summary.added <= 10);
        assert_eq!(summary.requested, 50);
    }

    #[tokio::test]
    async fn test_generate_rejects_bad_masks() {
        let (_db, service, fixture) = setup().await;
        for mask in ["79990000000", "7999abcXX"] {
            let result = service
                .generate(&GenerateNumbers {
                    mask: mask.into(),
                    quantity: 1,
                    provider_id: fixture.provider_id,
                    country_id: fixture.country_id,
                    operator_id: None,
                })
                .await;
            assert!(matches!(result, Err(DbError::Validation(_))), "{mask}");
        }
    }

    #[tokio::test]
    async fn test_delete_requires_filter() {
        let (db, service, fixture) = setup().await;
        db.phone_numbers()
            .insert_many(&numbers(&fixture, &["+79990000001", "+79990000002"]))
            .await
            .unwrap();

        assert!(matches!(
            service.delete(&PhoneNumberFilter::default()).await,
            Err(DbError::Validation(_))
        ));
        let deleted = service
            .delete(&PhoneNumberFilter {
                provider_id: Some(fixture.provider_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn test_fill_mask() {
        let filled = fill_mask("+7999XXX");
        assert_eq!(filled.len(), 8);
        assert!(filled.starts_with("+7999"));
        assert!(filled[5..].chars().all(|c| c.is_ascii_digit()));
    }
}
