//! Server hostname resolution.

use std::net::IpAddr;

use hickory_resolver::TokioResolver;
use rand::Rng;

use crate::error::{Error, Result};

/// Address family selection for the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpProtocol {
    /// IPv4 only (A records).
    V4,
    /// IPv6 only (AAAA records).
    V6,
    /// Whatever the resolver returns.
    #[default]
    Any,
}

/// Resolves `host` to the addresses of the requested family.
///
/// # Errors
///
/// Returns [`Error::Resolver`] when the resolver cannot be constructed,
/// the lookup fails, or no record of the requested family exists.
pub async fn resolve(host: &str, protocol: IpProtocol) -> Result<Vec<IpAddr>> {
    let resolver = TokioResolver::builder_tokio()
        .map_err(|e| Error::Resolver(e.to_string()))?
        .build();

    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| Error::Resolver(e.to_string()))?;

    let records: Vec<IpAddr> = lookup
        .iter()
        .filter(|addr| match protocol {
            IpProtocol::V4 => addr.is_ipv4(),
            IpProtocol::V6 => addr.is_ipv6(),
            IpProtocol::Any => true,
        })
        .collect();

    if records.is_empty() {
        return Err(Error::Resolver(format!("no address records for {host}")));
    }
    Ok(records)
}

/// Picks one record uniformly at random from the result set.
#[must_use]
pub fn pick_random(records: &[IpAddr]) -> Option<IpAddr> {
    if records.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..records.len());
    Some(records[index])
}
