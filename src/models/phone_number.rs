use serde::{Deserialize, Serialize};
use validator::Validate;

/// A rentable number from the pool. `number` is always normalized (`+digits`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: i64,
    pub number: String,
    pub provider_id: i64,
    pub country_id: i64,
    pub operator_id: Option<i64>,
    pub is_active: bool,
    pub is_in_use: bool,
    pub sort_order: i64,
}

/// A number to insert. Inserted numbers are active and free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhoneNumber {
    pub number: String,
    pub provider_id: i64,
    pub country_id: i64,
    pub operator_id: Option<i64>,
}

/// Filter for bulk deletion. At least one field must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PhoneNumberFilter {
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub is_in_use: Option<bool>,
}

impl PhoneNumberFilter {
    pub fn is_empty(&self) -> bool {
        self.provider_id.is_none() && self.country_id.is_none() && self.is_in_use.is_none()
    }
}

/// Request body for mask-based generation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateNumbers {
    /// Digits with `X` placeholders, e.g. `7999XXXXXXX`.
    #[validate(length(min = 1, max = 32))]
    pub mask: String,
    #[validate(range(min = 1, max = 1_000_000))]
    pub quantity: u32,
    pub provider_id: i64,
    pub country_id: i64,
    pub operator_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: u64,
    pub skipped: u64,
    pub invalid: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateSummary {
    pub added: u64,
    pub requested: u64,
}
