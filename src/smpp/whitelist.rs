//! IP whitelist for the inbound SMPP listener.

use std::{
    net::IpAddr,
    sync::{Arc, RwLock},
    time::Duration,
};

use ipnet::IpNet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::WhitelistConfig,
    db::{DbPool, DbResult},
};

/// Configured networks plus the addresses of active providers.
///
/// With no entries at all every peer is allowed.
#[derive(Debug)]
pub struct SmppWhitelist {
    configured: Vec<IpNet>,
    allow_localhost: bool,
    from_db: bool,
    providers: RwLock<Vec<IpNet>>,
}

impl SmppWhitelist {
    pub fn from_config(config: &WhitelistConfig) -> Self {
        Self {
            configured: config.configured_networks(),
            allow_localhost: config.allow_localhost,
            from_db: config.from_db,
            providers: RwLock::new(Vec::new()),
        }
    }

    /// No configured or provider entries.
    pub fn is_open(&self) -> bool {
        self.configured.is_empty() && self.provider_networks().is_empty()
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        if self.is_open() {
            return true;
        }
        let ip = ip.to_canonical();
        // 127.0.0.0/8 and ::1
        if self.allow_localhost && ip.is_loopback() {
            return true;
        }
        self.configured.iter().any(|net| net.contains(&ip))
            || self.provider_networks().iter().any(|net| net.contains(&ip))
    }

    pub fn len(&self) -> usize {
        self.configured.len() + self.provider_networks().len()
    }

    fn provider_networks(&self) -> Vec<IpNet> {
        self.providers
            .read()
            .map(|nets| nets.clone())
            .unwrap_or_default()
    }

    fn set_provider_networks(&self, nets: Vec<IpNet>) {
        match self.providers.write() {
            Ok(mut guard) => *guard = nets,
            Err(poisoned) => *poisoned.into_inner() = nets,
        }
    }

    /// Reload provider addresses. On error the previous set is kept.
    pub async fn refresh(&self, db: &DbPool) -> DbResult<usize> {
        if !self.from_db {
            return Ok(0);
        }
        let providers = db.catalog().list_active_providers().await?;

        let mut nets = Vec::new();
        for provider in &providers {
            nets.extend(resolve_host(&provider.smpp_host).await);
        }
        nets.sort();
        nets.dedup();

        let count = nets.len();
        self.set_provider_networks(nets);
        tracing::debug!(
            providers = providers.len(),
            networks = count,
            "SMPP whitelist refreshed from database"
        );
        Ok(count)
    }

    /// Refresh every `interval` until cancelled.
    pub async fn run_refresh(
        self: Arc<Self>,
        db: Arc<DbPool>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        if !self.from_db {
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.refresh(&db).await {
                tracing::warn!(error = %e, "SMPP whitelist refresh failed, keeping previous entries");
            }
        }
    }
}

/// Host networks for an IP literal or a DNS name. Lookup failures yield nothing.
async fn resolve_host(host: &str) -> Vec<IpNet> {
    let host = host.trim();
    if host.is_empty() {
        return Vec::new();
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return vec![IpNet::from(ip)];
    }
    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => addrs.map(|addr| IpNet::from(addr.ip().to_canonical())).collect(),
        Err(e) => {
            tracing::warn!(host, error = %e, "Failed to resolve provider host for whitelist");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ListSetting,
        db::tests::harness::{seed_fixture, sqlite_db},
        models::CreateProvider,
    };

    fn config(cidrs: Option<&str>, allow_localhost: bool) -> WhitelistConfig {
        WhitelistConfig {
            cidrs: cidrs.map(|c| ListSetting::Raw(c.to_string())),
            allow_localhost,
            from_db: true,
            refresh_secs: 60,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_whitelist_allows_everyone() {
        let whitelist = SmppWhitelist::from_config(&config(None, true));
        assert!(whitelist.is_open());
        assert!(whitelist.is_allowed(ip("203.0.113.9")));
    }

    #[test]
    fn test_configured_networks() {
        let whitelist =
            SmppWhitelist::from_config(&config(Some("78.40.196.153/32, 10.0.0.0/8"), false));
        assert!(!whitelist.is_open());
        assert!(whitelist.is_allowed(ip("78.40.196.153")));
        assert!(whitelist.is_allowed(ip("10.20.30.40")));
        assert!(!whitelist.is_allowed(ip("78.40.196.154")));
        assert!(!whitelist.is_allowed(ip("127.0.0.1")));
    }

    #[test]
    fn test_localhost_and_mapped_addresses() {
        let whitelist = SmppWhitelist::from_config(&config(Some("194.28.164.22"), true));
        assert!(whitelist.is_allowed(ip("127.0.0.1")));
        assert!(whitelist.is_allowed(ip("::1")));
        assert!(whitelist.is_allowed(ip("::ffff:194.28.164.22")));
    }

    #[tokio::test]
    async fn test_refresh_adds_provider_hosts() {
        let db = sqlite_db().await;
        seed_fixture(&db).await;
        db.catalog()
            .create_provider(CreateProvider {
                name: "second".into(),
                smpp_host: "198.51.100.7".into(),
                smpp_port: 2775,
                system_id: "u".into(),
                password: "p".into(),
                system_type: String::new(),
                is_active: true,
            })
            .await
            .unwrap();
        db.catalog()
            .create_provider(CreateProvider {
                name: "disabled".into(),
                smpp_host: "198.51.100.8".into(),
                smpp_port: 2775,
                system_id: "u".into(),
                password: "p".into(),
                system_type: String::new(),
                is_active: false,
            })
            .await
            .unwrap();

        let whitelist = SmppWhitelist::from_config(&config(None, false));
        assert_eq!(whitelist.refresh(&db).await.unwrap(), 2);
        assert!(!whitelist.is_open());
        assert!(whitelist.is_allowed(ip("198.51.100.7")));
        assert!(whitelist.is_allowed(ip("127.0.0.1")));
        assert!(!whitelist.is_allowed(ip("198.51.100.8")));
    }

    #[tokio::test]
    async fn test_resolve_host() {
        assert_eq!(resolve_host("10.1.1.1").await, vec![IpNet::from(ip("10.1.1.1"))]);
        assert!(resolve_host("").await.is_empty());
        assert!(resolve_host("host.invalid").await.is_empty());
    }
}
