use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::{ConfigError, split_list};

/// SMPP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmppConfig {
    /// Inbound listener (providers connect to us and send `submit_sm`).
    #[serde(default)]
    pub server: SmppServerConfig,

    /// Connection whitelist for the inbound listener.
    #[serde(default)]
    pub whitelist: WhitelistConfig,

    /// Outbound client workers (we bind to providers and receive `deliver_sm`).
    #[serde(default)]
    pub client: SmppClientConfig,

    /// How inbound messages are matched to activation sessions.
    #[serde(default)]
    pub matching: MatchingConfig,
}

impl SmppConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_pdu_bytes < 16 {
            return Err(ConfigError::Validation(
                "smpp.server.max_pdu_bytes must be at least 16".into(),
            ));
        }
        if self.server.system_id.len() > 15 {
            return Err(ConfigError::Validation(
                "smpp.server.system_id must be at most 15 characters".into(),
            ));
        }
        if self.matching.session_lookup_attempts == 0 {
            return Err(ConfigError::Validation(
                "smpp.matching.session_lookup_attempts must be at least 1".into(),
            ));
        }
        if self.client.enquire_link_secs == 0 {
            return Err(ConfigError::Validation(
                "smpp.client.enquire_link_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// A list setting that may be written as a TOML array or as a single string
/// holding a CSV, `;`-separated or JSON array value (handy with `${VAR}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListSetting {
    Items(Vec<ListItem>),
    Raw(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListItem {
    Int(i64),
    Str(String),
}

impl ListSetting {
    pub fn items(&self) -> Vec<String> {
        match self {
            ListSetting::Items(items) => items
                .iter()
                .map(|item| match item {
                    ListItem::Int(n) => n.to_string(),
                    ListItem::Str(s) => s.trim().to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect(),
            ListSetting::Raw(raw) => split_list(raw),
        }
    }
}

/// Inbound SMPP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmppServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// Port used when `ports` is unset or yields no valid port.
    #[serde(default = "default_smpp_port")]
    pub port: u16,

    /// Several ports, e.g. `[40000, 40001]`, `"40000,40001"` or `"40000;40001"`.
    #[serde(default)]
    pub ports: Option<ListSetting>,

    /// `system_id` returned in bind responses.
    #[serde(default = "default_system_id")]
    pub system_id: String,

    /// Largest accepted `command_length`.
    #[serde(default = "default_max_pdu_bytes")]
    pub max_pdu_bytes: usize,
}

impl Default for SmppServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_host: default_bind_host(),
            port: default_smpp_port(),
            ports: None,
            system_id: default_system_id(),
            max_pdu_bytes: default_max_pdu_bytes(),
        }
    }
}

impl SmppServerConfig {
    /// Ports to listen on: sorted, deduplicated, never empty.
    ///
    /// Entries that are not valid TCP ports are skipped with a warning.
    pub fn resolved_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .ports
            .as_ref()
            .map(ListSetting::items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| match item.parse::<u16>() {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    tracing::warn!(value = %item, "Ignoring invalid SMPP port");
                    None
                }
            })
            .collect();
        ports.sort_unstable();
        ports.dedup();
        if ports.is_empty() {
            ports.push(self.port);
        }
        ports
    }
}

/// Whitelist for inbound SMPP connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistConfig {
    /// IPs or CIDRs, e.g. `["78.40.196.153/32", "194.28.164.22"]` or a CSV string.
    #[serde(default)]
    pub cidrs: Option<ListSetting>,

    /// Also allow `127.0.0.0/8` and `::1` once any other entry exists.
    #[serde(default = "default_true")]
    pub allow_localhost: bool,

    /// Add the `smpp_host` of every active provider.
    #[serde(default = "default_true")]
    pub from_db: bool,

    /// Seconds between refreshes of the database-derived entries.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            cidrs: None,
            allow_localhost: true,
            from_db: true,
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl WhitelistConfig {
    /// Networks from `cidrs`. Bare addresses become host networks.
    ///
    /// Invalid entries are skipped with a warning.
    pub fn configured_networks(&self) -> Vec<IpNet> {
        self.cidrs
            .as_ref()
            .map(ListSetting::items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let parsed = parse_network(&item);
                if parsed.is_none() {
                    tracing::warn!(value = %item, "Ignoring invalid SMPP whitelist entry");
                }
                parsed
            })
            .collect()
    }
}

/// Parse `a.b.c.d`, `a.b.c.d/n` or an IPv6 equivalent.
pub fn parse_network(value: &str) -> Option<IpNet> {
    let value = value.trim();
    if let Ok(net) = value.parse::<IpNet>() {
        return Some(net.trunc());
    }
    value.parse::<IpAddr>().ok().map(IpNet::from)
}

/// Outbound SMPP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmppClientConfig {
    /// Start one worker per active provider.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before reconnecting after a network failure.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Delay before reconnecting after the provider rejected our credentials.
    #[serde(default = "default_auth_failure_delay")]
    pub auth_failure_delay_secs: u64,

    /// Interval between `enquire_link` keepalives.
    #[serde(default = "default_enquire_link")]
    pub enquire_link_secs: u64,

    /// Timeout for the TCP connect and for the bind response.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SmppClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_delay_secs: default_reconnect_delay(),
            auth_failure_delay_secs: default_auth_failure_delay(),
            enquire_link_secs: default_enquire_link(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Session matching for inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Service codes whose sessions accept any message on their number.
    #[serde(default = "default_accept_any")]
    pub accept_any_service_codes: Vec<String>,

    /// Lookups for an open session while a reservation is in flight.
    #[serde(default = "default_lookup_attempts")]
    pub session_lookup_attempts: u32,

    /// Delay between lookups.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lifetime of a pending reservation signal.
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            accept_any_service_codes: default_accept_any(),
            session_lookup_attempts: default_lookup_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            pending_ttl_secs: default_pending_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_smpp_port() -> u16 {
    40000
}

fn default_system_id() -> String {
    "smsgate".into()
}

fn default_max_pdu_bytes() -> usize {
    64 * 1024
}

fn default_refresh_secs() -> u64 {
    60
}

fn default_reconnect_delay() -> u64 {
    15
}

fn default_auth_failure_delay() -> u64 {
    30
}

fn default_enquire_link() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_accept_any() -> Vec<String> {
    vec!["nitro".into()]
}

fn default_lookup_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_pending_ttl() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn server_with_ports(toml_value: &str) -> SmppServerConfig {
        toml::from_str(&format!("ports = {toml_value}")).unwrap()
    }

    #[rstest]
    #[case::toml_array("[40001, 40000]", vec![40000, 40001])]
    #[case::toml_string_array(r#"["40000", "40001"]"#, vec![40000, 40001])]
    #[case::csv(r#""40000,40001""#, vec![40000, 40001])]
    #[case::semicolons(r#""40001;40000;40001""#, vec![40000, 40001])]
    #[case::json_string(r#"'["40000","40002"]'"#, vec![40000, 40002])]
    #[case::invalid_skipped(r#""abc,40005,70000""#, vec![40005])]
    #[case::all_invalid_fall_back(r#""abc""#, vec![40000])]
    #[case::empty_falls_back(r#""""#, vec![40000])]
    fn test_resolved_ports(#[case] value: &str, #[case] expected: Vec<u16>) {
        assert_eq!(server_with_ports(value).resolved_ports(), expected);
    }

    #[test]
    fn test_default_port_when_unset() {
        let config = SmppServerConfig::default();
        assert_eq!(config.resolved_ports(), vec![40000]);
        assert_eq!(config.system_id, "smsgate");
        assert_eq!(config.max_pdu_bytes, 65536);
    }

    #[rstest]
    #[case("78.40.196.153/32", "78.40.196.153/32")]
    #[case("194.28.164.22", "194.28.164.22/32")]
    #[case("10.1.2.3/8", "10.0.0.0/8")]
    #[case("::1", "::1/128")]
    fn test_parse_network(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(parse_network(value).unwrap().to_string(), expected);
    }

    #[test]
    fn test_whitelist_skips_invalid_entries() {
        let config: WhitelistConfig =
            toml::from_str(r#"cidrs = "78.40.196.153/32, not-an-ip, 194.28.164.22""#).unwrap();
        let nets: Vec<String> = config
            .configured_networks()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(nets, vec!["78.40.196.153/32", "194.28.164.22/32"]);
    }

    #[test]
    fn test_matching_defaults() {
        let config = MatchingConfig::default();
        assert_eq!(config.accept_any_service_codes, vec!["nitro"]);
        assert_eq!(config.session_lookup_attempts, 5);
        assert_eq!(config.retry_delay_ms, 200);
        assert_eq!(config.pending_ttl_secs, 5);
    }

    #[test]
    fn test_client_defaults() {
        let config = SmppClientConfig::default();
        assert_eq!(config.reconnect_delay_secs, 15);
        assert_eq!(config.auth_failure_delay_secs, 30);
        assert_eq!(config.enquire_link_secs, 30);
    }
}
