//! Validates and resolves the scan target before any probe is sent.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use log::debug;
use tokio::{fs, io};

use crate::error::ScanError;

/// A host that passed validation, together with the address probes go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    identifier: String,
    addr: IpAddr,
}

impl ScanTarget {
    /// Resolves `identifier` into a target, or fails with
    /// [`ScanError::InvalidTarget`].
    pub async fn resolve(
        identifier: &str,
        resolver: &TokioAsyncResolver,
    ) -> Result<Self, ScanError> {
        let identifier = identifier.trim();
        let addr = resolve_target(identifier, resolver)
            .await
            .ok_or_else(|| ScanError::InvalidTarget(identifier.to_owned()))?;

        Ok(Self {
            identifier: identifier.to_owned(),
            addr,
        })
    }

    /// The string the operator asked for.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    pub const fn socket(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.addr, port)
    }
}

impl From<IpAddr> for ScanTarget {
    fn from(addr: IpAddr) -> Self {
        Self {
            identifier: addr.to_string(),
            addr,
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identifier == self.addr.to_string() {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "{} ({})", self.identifier, self.addr)
        }
    }
}

/// True if `identifier` is an IP literal or a name that resolves to at least
/// one address. Resolution failures are a normal negative answer.
///
/// ```rust
/// # use tcpsweep::address::{get_resolver, validate};
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let resolver = get_resolver(&None).await;
/// assert!(validate("127.0.0.1", &resolver).await);
/// assert!(validate("::1", &resolver).await);
/// # });
/// ```
pub async fn validate(identifier: &str, resolver: &TokioAsyncResolver) -> bool {
    resolve_target(identifier, resolver).await.is_some()
}

/// Turns an IP literal or host name into the address to scan.
///
/// Literals are accepted as-is. Names go to the system resolver first and
/// then to the backup DNS resolver.
pub async fn resolve_target(identifier: &str, resolver: &TokioAsyncResolver) -> Option<IpAddr> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return None;
    }

    if let Ok(ip) = IpAddr::from_str(identifier) {
        return Some(ip);
    }

    preferred_address(&resolve_ips_from_host(identifier, resolver).await)
}

/// Picks the address to scan from a name's addresses: the first IPv4 one,
/// or the first of any family when there is none.
pub fn preferred_address(ips: &[IpAddr]) -> Option<IpAddr> {
    ips.iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| ips.first().copied())
}

/// Uses DNS to get the IPS associated with host
async fn resolve_ips_from_host(source: &str, backup_resolver: &TokioAsyncResolver) -> Vec<IpAddr> {
    if let Ok(addrs) = tokio::net::lookup_host((source, 80)).await {
        let ips: Vec<IpAddr> = addrs.map(|x| x.ip()).collect();
        if !ips.is_empty() {
            return ips;
        }
    }

    match backup_resolver.lookup_ip(source).await {
        Ok(addrs) => addrs.iter().collect(),
        Err(e) => {
            debug!("Backup resolver could not resolve {source}: {e}");
            Vec::new()
        }
    }
}

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver (default
///       behaviour).
pub async fn get_resolver(resolver: &Option<String>) -> TokioAsyncResolver {
    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            let resolver_ips = match read_resolver_from_file(r).await {
                Ok(ips) => ips,
                Err(_) => r
                    .split(',')
                    .filter_map(|r| IpAddr::from_str(r.trim()).ok())
                    .collect::<Vec<_>>(),
            };
            for ip in resolver_ips {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        }
        None => TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
        }),
    }
}

/// Parses and input file of IPs for use in DNS resolution.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}
