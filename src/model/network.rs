//! Network interface configuration for the installed system.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A static address assigned to an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddr {
    pub ip: String,
    pub netmask: String,
}

/// Configuration of one network interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkInterface {
    pub name: String,

    #[serde(default)]
    pub dhcp: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addrs: Vec<InterfaceAddr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

impl NetworkInterface {
    pub fn dhcp(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dhcp: true,
            ..Self::default()
        }
    }

    /// Problems with a static configuration; DHCP interfaces only need a name.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("interface name must not be empty".to_string());
        }
        if self.dhcp {
            return problems;
        }

        if self.addrs.is_empty() {
            problems.push(format!("{}: static interface has no address", self.name));
        }
        for addr in &self.addrs {
            if addr.ip.parse::<IpAddr>().is_err() {
                problems.push(format!("{}: invalid address '{}'", self.name, addr.ip));
            }
            if !valid_netmask(&addr.netmask, &addr.ip) {
                problems.push(format!("{}: invalid netmask '{}'", self.name, addr.netmask));
            }
        }
        if let Some(gateway) = &self.gateway {
            if gateway.parse::<IpAddr>().is_err() {
                problems.push(format!("{}: invalid gateway '{}'", self.name, gateway));
            }
        }

        problems
    }
}

/// Either a prefix length (`24`) or a dotted mask (`255.255.255.0`), in the
/// address family of `ip`. An unparsable `ip` is reported on its own.
fn valid_netmask(mask: &str, ip: &str) -> bool {
    let family = ip.parse::<IpAddr>().ok();

    if let Ok(prefix) = mask.parse::<u8>() {
        let max = match family {
            Some(IpAddr::V4(_)) => 32,
            Some(IpAddr::V6(_)) | None => 128,
        };
        return prefix <= max;
    }

    match (mask.parse::<IpAddr>(), family) {
        (Err(_), _) => false,
        (Ok(mask), Some(ip)) => mask.is_ipv4() == ip.is_ipv4(),
        (Ok(_), None) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dhcp_interface_is_valid() {
        assert!(NetworkInterface::dhcp("eth0").problems().is_empty());
    }

    #[test]
    fn test_static_interface_needs_address() {
        let iface = NetworkInterface {
            name: "eth0".to_string(),
            ..NetworkInterface::default()
        };
        let problems = iface.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("no address"));
    }

    #[test]
    fn test_static_interface_checks_addresses() {
        let iface = NetworkInterface {
            name: "enp1s0".to_string(),
            addrs: vec![
                InterfaceAddr {
                    ip: "10.0.0.5".to_string(),
                    netmask: "24".to_string(),
                },
                InterfaceAddr {
                    ip: "10.0.0.300".to_string(),
                    netmask: "255.255.255.0".to_string(),
                },
            ],
            gateway: Some("router".to_string()),
            ..NetworkInterface::default()
        };
        let problems = iface.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("10.0.0.300")));
        assert!(problems.iter().any(|p| p.contains("gateway")));
    }

    #[test]
    fn test_prefix_length_follows_address_family() {
        let iface = |ip: &str, netmask: &str| NetworkInterface {
            name: "eth0".to_string(),
            addrs: vec![InterfaceAddr {
                ip: ip.to_string(),
                netmask: netmask.to_string(),
            }],
            ..NetworkInterface::default()
        };

        assert!(iface("10.0.0.5", "32").problems().is_empty());
        assert!(iface("fd00::5", "64").problems().is_empty());
        assert!(iface("fd00::5", "128").problems().is_empty());

        let problems = iface("10.0.0.5", "64").problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("invalid netmask '64'"));

        assert_eq!(iface("fd00::5", "129").problems().len(), 1);
        assert_eq!(iface("10.0.0.5", "ffff:ffff::").problems().len(), 1);
    }
}
