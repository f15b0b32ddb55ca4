use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    system_conf, TokioAsyncResolver,
};

use crate::error::NetworkError;

/// DNS resolution modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsMode {
    /// System configuration with a local cache in front
    LocalCache,
    /// Explicit resolver configuration
    Custom(ResolverConfig),
}

/// A DNS resolution entry with time-based expiration
#[derive(Debug, Clone)]
struct DnsCacheEntry {
    addresses: Vec<IpAddr>,
    expires: Instant,
}

/// Caching resolver shared by the raw socket adapters
pub struct HostResolver {
    cache: Arc<RwLock<HashMap<String, DnsCacheEntry>>>,
    mode: DnsMode,
    resolver: TokioAsyncResolver,
    default_ttl: Duration,
}

impl std::fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResolver")
            .field("mode", &self.mode)
            .field("default_ttl", &self.default_ttl)
            .field("cache_entries", &self.cache.read().len())
            .finish()
    }
}

impl HostResolver {
    pub fn new() -> Self {
        Self::with_mode(DnsMode::LocalCache)
    }

    pub fn with_mode(mode: DnsMode) -> Self {
        let (config, mut opts) = match &mode {
            DnsMode::LocalCache => system_config(),
            DnsMode::Custom(custom) => (custom.clone(), ResolverOpts::default()),
        };

        opts.positive_min_ttl = Some(Duration::from_secs(60));
        opts.negative_min_ttl = Some(Duration::from_secs(30));
        opts.use_hosts_file = true;

        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            mode,
            resolver: TokioAsyncResolver::tokio(config, opts),
            default_ttl: Duration::from_secs(300),
        }
    }

    /// Resolve a host name. IP literals are returned without a lookup.
    pub async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, NetworkError> {
        let bare = hostname.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(cached) = self.check_cache(hostname) {
            return Ok(cached);
        }

        let response = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| map_resolve_error(hostname, e))?;

        let addresses: Vec<IpAddr> = response.iter().collect();
        if addresses.is_empty() {
            return Err(NetworkError::HostNotFound(format!(
                "{} has no addresses",
                hostname
            )));
        }

        self.update_cache(hostname.to_string(), addresses.clone());
        Ok(addresses)
    }

    /// Resolve and pair every address with `port`
    pub async fn socket_addrs(&self, hostname: &str, port: u16) -> Result<Vec<SocketAddr>, NetworkError> {
        Ok(self
            .resolve(hostname)
            .await?
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .collect())
    }

    fn check_cache(&self, hostname: &str) -> Option<Vec<IpAddr>> {
        let cache = self.cache.read();
        cache
            .get(hostname)
            .filter(|entry| entry.expires > Instant::now())
            .map(|entry| entry.addresses.clone())
    }

    fn update_cache(&self, hostname: String, addresses: Vec<IpAddr>) {
        self.cache.write().insert(
            hostname,
            DnsCacheEntry {
                addresses,
                expires: Instant::now() + self.default_ttl,
            },
        );
    }

    pub fn mode(&self) -> &DnsMode {
        &self.mode
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.default_ttl = ttl;
    }
}

impl Default for HostResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// The host's resolver configuration, or public resolvers if it cannot be read
fn system_config() -> (ResolverConfig, ResolverOpts) {
    match system_conf::read_system_conf() {
        Ok(system) => system,
        Err(e) => {
            log::warn!("Falling back to default resolvers, system configuration unreadable: {}", e);
            (ResolverConfig::default(), ResolverOpts::default())
        }
    }
}

fn map_resolve_error(hostname: &str, err: ResolveError) -> NetworkError {
    match err.kind() {
        ResolveErrorKind::Timeout => {
            NetworkError::Timeout(format!("DNS lookup for {} timed out", hostname))
        }
        ResolveErrorKind::NoRecordsFound { .. } => {
            NetworkError::HostNotFound(format!("{} could not be resolved", hostname))
        }
        _ => NetworkError::HostNotFound(format!("{}: {}", hostname, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literals_skip_lookup() {
        let resolver = HostResolver::new();

        let v4 = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(v4, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);

        let v6 = resolver.socket_addrs("[::1]", 1965).await.unwrap();
        assert_eq!(v6[0].port(), 1965);
        assert!(v6[0].ip().is_loopback());
    }

    #[test]
    fn test_local_mode_follows_system_configuration() {
        let (config, _) = system_config();
        match system_conf::read_system_conf() {
            Ok((system, _)) => assert_eq!(config, system),
            Err(_) => assert_eq!(config, ResolverConfig::default()),
        }
    }

    #[tokio::test]
    async fn test_cache_is_used() {
        let resolver = HostResolver::new();
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        resolver.update_cache("cached.invalid".to_string(), vec![addr]);

        assert_eq!(resolver.resolve("cached.invalid").await.unwrap(), vec![addr]);

        resolver.clear_cache();
        assert!(resolver.check_cache("cached.invalid").is_none());
    }
}
