use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Reporting window for API key statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsPeriod {
    #[default]
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "7days")]
    SevenDays,
    #[serde(rename = "month")]
    Month,
}

impl StatsPeriod {
    /// Half-open `[start, end)` window in UTC relative to `now`.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now);
        match self {
            StatsPeriod::Today => (today_start, now),
            StatsPeriod::Yesterday => (today_start - Duration::days(1), today_start),
            StatsPeriod::SevenDays => (today_start - Duration::days(7), now),
            StatsPeriod::Month => {
                let month_start = Utc
                    .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                    .single()
                    .unwrap_or(today_start);
                (month_start, now)
            }
        }
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(StatsPeriod::Today),
            "yesterday" => Ok(StatsPeriod::Yesterday),
            "7days" => Ok(StatsPeriod::SevenDays),
            "month" => Ok(StatsPeriod::Month),
            other => Err(format!("unknown period '{other}'")),
        }
    }
}

/// Messages received for one service through one API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSmsCount {
    pub api_key_id: i64,
    pub service_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBreakdown {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyStats {
    pub api_key_id: i64,
    pub key_prefix: String,
    pub description: Option<String>,
    pub total_sms: i64,
    pub services: Vec<ServiceBreakdown>,
}
