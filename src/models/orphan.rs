use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message that could not be matched to an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanSms {
    pub id: i64,
    pub phone_number: String,
    pub source_addr: Option<String>,
    pub text: String,
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub client_ip: Option<String>,
    pub system_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewOrphanSms {
    pub phone_number: String,
    pub source_addr: Option<String>,
    pub text: String,
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub client_ip: Option<String>,
    pub system_id: Option<String>,
}

/// One row of the orphan report: traffic to a number from one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanReportRow {
    pub phone_number: String,
    pub source_addr: Option<String>,
    pub count: i64,
    pub sample_text: String,
    pub last_received_at: DateTime<Utc>,
}

/// A row touched by orphan enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanEnrichment {
    pub id: i64,
    pub phone_number: String,
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub operator_id: Option<i64>,
}

/// Drill-down into the orphans of one sender.
#[derive(Debug, Clone, Default)]
pub struct OrphanNumbersFilter {
    pub source_addr: String,
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub operator_id: Option<i64>,
}

/// Numbers behind one sender's orphans, with the filter's reference names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanNumbers {
    pub source_addr: String,
    pub provider_name: Option<String>,
    pub country_name: Option<String>,
    pub operator_name: Option<String>,
    pub numbers: Vec<String>,
}

impl OrphanNumbers {
    /// One `phone_number` column.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("phone_number\n");
        for number in &self.numbers {
            out.push_str(number);
            out.push('\n');
        }
        out
    }
}
