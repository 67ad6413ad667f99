//! Network fencing through the OSD blocklist.
//!
//! Fencing takes a CIDR list describing the nodes to cut off, expands it to
//! individual addresses and adds each to the cluster blocklist. Unfencing
//! walks the live blocklist and removes the entries (including their
//! port/nonce suffixes) that fall inside the requested CIDRs.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use tracing::{info, instrument, warn};

use crate::admin::OsdAdmin;
use crate::error::{CephixError, Result};

/// Upper bound of addresses a single fence request may expand to; wider
/// ranges are almost certainly a typo in the CIDR.
const MAX_FENCE_ADDRESSES: usize = 65536;

/// Expand a CIDR list into individual addresses.
pub fn expand_cidrs(cidrs: &[String]) -> Result<Vec<IpAddr>> {
    let mut addresses = Vec::new();
    for cidr in cidrs {
        let network = IpNetwork::from_str(cidr).map_err(|e| {
            CephixError::InvalidArgument(format!("invalid CIDR {cidr:?}: {e}"))
        })?;
        for addr in network.iter() {
            addresses.push(addr);
            if addresses.len() > MAX_FENCE_ADDRESSES {
                return Err(CephixError::InvalidArgument(format!(
                    "CIDR list expands past {MAX_FENCE_ADDRESSES} addresses"
                )));
            }
        }
    }
    if addresses.is_empty() {
        return Err(CephixError::InvalidArgument(
            "no addresses to fence".to_string(),
        ));
    }
    Ok(addresses)
}

/// IP part of a blocklist entry (`1.2.3.4:0/123` or `[2001:db8::1]:0/0`).
fn entry_ip(addr: &str) -> Option<IpAddr> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (ip, _) = rest.split_once(']')?;
        return IpAddr::from_str(ip).ok();
    }
    let ip = addr.split(':').next()?;
    IpAddr::from_str(ip).ok()
}

/// Fence controller over the OSD admin seam.
pub struct NetworkFence<'a> {
    osd_admin: &'a dyn OsdAdmin,
}

impl<'a> NetworkFence<'a> {
    pub fn new(osd_admin: &'a dyn OsdAdmin) -> Self {
        Self { osd_admin }
    }

    /// Blocklist every address in the CIDR list.
    #[instrument(skip(self, cidrs), fields(cidrs = cidrs.len()))]
    pub async fn fence(&self, cidrs: &[String]) -> Result<()> {
        let addresses = expand_cidrs(cidrs)?;
        for addr in &addresses {
            self.osd_admin.blocklist_add(&addr.to_string()).await?;
        }
        info!(count = addresses.len(), "network fence applied");
        Ok(())
    }

    /// Remove every blocklist entry that falls inside the CIDR list.
    #[instrument(skip(self, cidrs), fields(cidrs = cidrs.len()))]
    pub async fn unfence(&self, cidrs: &[String]) -> Result<()> {
        let networks: Vec<IpNetwork> = cidrs
            .iter()
            .map(|cidr| {
                IpNetwork::from_str(cidr).map_err(|e| {
                    CephixError::InvalidArgument(format!("invalid CIDR {cidr:?}: {e}"))
                })
            })
            .collect::<Result<_>>()?;

        let entries = self.osd_admin.blocklist_list().await?;
        let mut removed = 0usize;
        for entry in entries {
            let Some(ip) = entry_ip(&entry.addr) else {
                warn!(addr = %entry.addr, "unparseable blocklist entry");
                continue;
            };
            if networks.iter().any(|network| network.contains(ip)) {
                self.osd_admin.blocklist_remove(&entry.addr).await?;
                removed += 1;
            }
        }
        info!(removed, "network fence lifted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::OsdAdmin;
    use crate::mock::MockCluster;

    #[test]
    fn test_expand_cidrs() {
        let addrs = expand_cidrs(&["10.0.0.0/30".to_string()]).unwrap();
        assert_eq!(addrs.len(), 4);

        assert!(expand_cidrs(&["10.0.0.0/8".to_string()]).is_err());
        assert!(expand_cidrs(&["not-a-cidr".to_string()]).is_err());
        assert!(expand_cidrs(&[]).is_err());
    }

    #[test]
    fn test_entry_ip_parsing() {
        assert_eq!(
            entry_ip("10.1.2.3:6789/42"),
            Some(IpAddr::from_str("10.1.2.3").unwrap())
        );
        assert_eq!(
            entry_ip("[2001:db8::1]:0/0"),
            Some(IpAddr::from_str("2001:db8::1").unwrap())
        );
        assert!(entry_ip("garbage:").is_none());
    }

    #[tokio::test]
    async fn test_fence_unfence_round_trip() {
        let cluster = MockCluster::new();
        let fence = NetworkFence::new(&cluster);

        fence.fence(&["192.168.1.0/30".to_string()]).await.unwrap();
        assert_eq!(cluster.blocklist_list().await.unwrap().len(), 4);

        // A foreign entry outside the CIDR survives the unfence.
        cluster.blocklist_add("172.16.0.9:0/7").await.unwrap();

        fence.unfence(&["192.168.1.0/30".to_string()]).await.unwrap();
        let remaining = cluster.blocklist_list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].addr, "172.16.0.9:0/7");
    }
}
