//! Network interface resolution for discovery
//!
//! Callers name the interface to probe on either by OS name ("eth0") or by
//! one of its assigned addresses ("192.168.1.5"). Enumeration sits behind a
//! trait so tests can substitute a fixed interface list.

use crate::error::{OnvifError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::IpAddr;

/// Read-only snapshot of one OS network interface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterfaceInfo {
    pub name: String,
    pub addrs: Vec<IpAddr>,
    pub is_up: bool,
    pub is_multicast: bool,
}

impl NetworkInterfaceInfo {
    /// First IPv4 address assigned to the interface, if any
    pub fn ipv4_addr(&self) -> Option<std::net::Ipv4Addr> {
        self.addrs.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Source of interface snapshots, injectable for tests
pub trait InterfaceSource: Send + Sync {
    /// Enumerate the currently configured interfaces. Re-queried on every
    /// resolution call; never cached.
    fn list(&self) -> Result<Vec<NetworkInterfaceInfo>>;
}

/// Interface source backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn list(&self) -> Result<Vec<NetworkInterfaceInfo>> {
        Ok(pnet_datalink::interfaces()
            .into_iter()
            .map(|iface| NetworkInterfaceInfo {
                is_up: iface.is_up(),
                is_multicast: iface.is_multicast(),
                addrs: iface.ips.iter().map(|net| net.ip()).collect(),
                name: iface.name,
            })
            .collect())
    }
}

/// Resolve a user-supplied interface specifier (name or assigned IP) to a
/// concrete interface.
///
/// Name matches win over address matches; address matching is exact, not
/// subnet-based. The failure message lists every available interface with
/// its addresses so the caller can correct the specifier.
pub fn resolve_interface(spec: &str, source: &dyn InterfaceSource) -> Result<NetworkInterfaceInfo> {
    let interfaces = source.list()?;

    if let Some(iface) = interfaces.iter().find(|iface| iface.name == spec) {
        return Ok(iface.clone());
    }

    if let Ok(wanted) = spec.parse::<IpAddr>() {
        if let Some(iface) = interfaces.iter().find(|iface| iface.addrs.contains(&wanted)) {
            return Ok(iface.clone());
        }
    }

    let mut listing = String::new();
    for iface in &interfaces {
        let addrs: Vec<String> = iface.addrs.iter().map(|a| a.to_string()).collect();
        let _ = write!(listing, "\n  {} [{}]", iface.name, addrs.join(", "));
    }
    Err(OnvifError::interface_not_found(format!(
        "no interface matches {spec:?}; available interfaces:{listing}"
    )))
}
