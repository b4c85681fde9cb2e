use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Activation API (`/stubs/handler_api.php`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Balance reported by `getBalance`. Billing is not tracked.
    #[serde(default = "default_balance")]
    pub balance: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            balance: default_balance(),
        }
    }
}

impl ApiConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.balance < 0 {
            return Err(ConfigError::Validation(
                "api.balance cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

fn default_balance() -> i64 {
    9999
}
