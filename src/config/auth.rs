use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Admin API authentication.
///
/// The activation API authenticates with per-reseller API keys stored in the
/// database. The `/admin` routes use a single bearer token from config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Bearer token for `/admin`. When unset, the admin API is unauthenticated
    /// and a warning is logged at startup.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl AuthConfig {
    /// Whether `token` matches the configured admin token.
    ///
    /// Always true when no token is configured.
    pub fn admin_token_matches(&self, token: Option<&str>) -> bool {
        match (&self.admin_token, token) {
            (None, _) => true,
            (Some(expected), Some(given)) => {
                expected.as_bytes().ct_eq(given.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }
}
