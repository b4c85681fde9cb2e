//! Reference data: services, their allowed senders, countries, operators and
//! SMPP providers.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A service numbers are rented for (e.g. Telegram, code `tg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateService {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 10))]
    pub code: String,
}

/// A sender name that identifies messages from a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSender {
    pub id: i64,
    pub name: String,
    pub service_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAllowedSender {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub service_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub iso_code: Option<String>,
    pub phone_code: Option<String>,
}

/// Countries carry explicit ids that resellers pass as `country=`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCountry {
    #[validate(range(min = 0))]
    pub id: i64,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 8))]
    pub iso_code: Option<String>,
    #[validate(length(max = 8))]
    pub phone_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    pub country_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOperator {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub country_id: i64,
}

/// An upstream SMPP provider the client workers bind to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub smpp_host: String,
    pub smpp_port: u16,
    pub system_id: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub system_type: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProvider {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub smpp_host: String,
    #[validate(range(min = 1))]
    pub smpp_port: u16,
    #[validate(length(min = 1, max = 15))]
    pub system_id: String,
    #[validate(length(max = 8))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 12))]
    pub system_type: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}
