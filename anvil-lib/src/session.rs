//! `session` is a module holding the read-only configuration of a
//! conformance test session.
//!
//! The configuration describes the environment in which the message
//! exchanges are performed: the network interface, the addresses and
//! ports of the tested server, the reply wait interval and the wait
//! factors compensating for the slow deployments. It is typically
//! loaded from a JSON file once and shared between the test steps.
//! The exchange layer never mutates it.

use std::{
    fs,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents errors returned when reading the session configuration.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An error returned when the configuration file can't be read.
    #[error("error reading the session configuration from {path:?}: {source}")]
    Read {
        /// The configuration file location.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },
    /// An error returned when the configuration file is not valid JSON
    /// or lacks the mandatory parameters.
    #[error("error parsing the session configuration from {path:?}: {source}")]
    Parse {
        /// The configuration file location.
        path: String,
        /// The underlying parser error.
        source: serde_json::Error,
    },
}

/// An enum distinguishing the deployment types of the tested server.
///
/// Some deployments respond slower than a single standalone server.
/// A High Availability pair synchronizes the lease updates with its
/// partner and a RADIUS-backed server waits for an external service
/// before answering. The reply wait interval is scaled accordingly.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Deployment {
    /// A standalone server.
    #[default]
    Standard,
    /// A pair of cooperating servers.
    HighAvailability,
    /// A server consulting a RADIUS service before answering.
    Radius,
}

/// A structure holding the session configuration.
///
/// All parameters have defaults suitable for testing a server listening
/// on the loopback interface, so a configuration file only needs to
/// specify the values differing from the defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Name of the network interface used for the exchanges.
    #[serde(default = "SessionConfig::default_iface")]
    pub iface: String,
    /// Source address of the DHCPv4 messages.
    #[serde(default = "SessionConfig::default_client_addr_v4")]
    pub client_addr_v4: Ipv4Addr,
    /// Address of the tested DHCPv4 server.
    #[serde(default = "SessionConfig::default_server_addr_v4")]
    pub server_addr_v4: Ipv4Addr,
    /// Source port of the DHCPv4 messages.
    #[serde(default = "SessionConfig::default_client_port_v4")]
    pub client_port_v4: u16,
    /// Port on which the tested DHCPv4 server listens.
    #[serde(default = "SessionConfig::default_server_port_v4")]
    pub server_port_v4: u16,
    /// Source address of the DHCPv6 messages.
    #[serde(default = "SessionConfig::default_client_addr_v6")]
    pub client_addr_v6: Ipv6Addr,
    /// Address of the tested DHCPv6 server.
    ///
    /// It defaults to the All_DHCP_Relay_Agents_and_Servers multicast
    /// address. Specify a global unicast address to test the unicast
    /// option behavior.
    #[serde(default = "SessionConfig::default_server_addr_v6")]
    pub server_addr_v6: Ipv6Addr,
    /// Source port of the DHCPv6 messages.
    #[serde(default = "SessionConfig::default_client_port_v6")]
    pub client_port_v6: u16,
    /// Port on which the tested DHCPv6 server listens.
    #[serde(default = "SessionConfig::default_server_port_v6")]
    pub server_port_v6: u16,
    /// Address of the DNS server queried in the DDNS verification steps.
    #[serde(default)]
    pub dns_addr: Option<IpAddr>,
    /// Port of the DNS server queried in the DDNS verification steps.
    #[serde(default = "SessionConfig::default_dns_port")]
    pub dns_port: u16,
    /// Base reply wait interval in milliseconds.
    #[serde(default = "SessionConfig::default_wait_interval_ms")]
    pub wait_interval_ms: u64,
    /// The deployment type of the tested server.
    #[serde(default)]
    pub deployment: Deployment,
    /// Wait interval multiplier applied for the High Availability pairs.
    #[serde(default = "SessionConfig::default_ha_wait_factor")]
    pub ha_wait_factor: u32,
    /// Wait interval multiplier applied for the RADIUS-backed servers.
    #[serde(default = "SessionConfig::default_radius_wait_factor")]
    pub radius_wait_factor: u32,
    /// First address of the tested server's v4 pool.
    ///
    /// The canned scenarios assert that the leased address belongs here.
    #[serde(default)]
    pub expected_address_v4: Option<Ipv4Addr>,
    /// First address of the tested server's v6 pool.
    #[serde(default)]
    pub expected_address_v6: Option<Ipv6Addr>,
}

impl SessionConfig {
    fn default_iface() -> String {
        "lo".to_string()
    }

    fn default_client_addr_v4() -> Ipv4Addr {
        Ipv4Addr::UNSPECIFIED
    }

    fn default_server_addr_v4() -> Ipv4Addr {
        Ipv4Addr::BROADCAST
    }

    fn default_client_port_v4() -> u16 {
        68
    }

    fn default_server_port_v4() -> u16 {
        67
    }

    fn default_client_addr_v6() -> Ipv6Addr {
        Ipv6Addr::UNSPECIFIED
    }

    fn default_server_addr_v6() -> Ipv6Addr {
        // All_DHCP_Relay_Agents_and_Servers.
        "ff02::1:2".parse().unwrap()
    }

    fn default_client_port_v6() -> u16 {
        546
    }

    fn default_server_port_v6() -> u16 {
        547
    }

    fn default_dns_port() -> u16 {
        53
    }

    fn default_wait_interval_ms() -> u64 {
        1000
    }

    fn default_ha_wait_factor() -> u32 {
        4
    }

    fn default_radius_wait_factor() -> u32 {
        2
    }

    /// Reads the configuration from a JSON file.
    ///
    /// # Parameters
    ///
    /// - `path` is the configuration file location.
    ///
    /// # Errors
    ///
    /// It returns the [`SessionError::Read`] error when the file can't be
    /// read and the [`SessionError::Parse`] error when its contents are
    /// not a valid configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SessionConfig, SessionError> {
        let contents = fs::read_to_string(&path).map_err(|source| SessionError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SessionError::Parse {
            path: path.as_ref().display().to_string(),
            source,
        })
    }

    /// Returns the reply wait interval with the deployment factor applied.
    ///
    /// The base interval is multiplied by the configured wait factor when
    /// the deployment is a High Availability pair or a RADIUS-backed
    /// server. A standalone server uses the base interval.
    pub fn wait_interval(&self) -> Duration {
        let factor = match self.deployment {
            Deployment::Standard => 1,
            Deployment::HighAvailability => self.ha_wait_factor.max(1),
            Deployment::Radius => self.radius_wait_factor.max(1),
        };
        Duration::from_millis(self.wait_interval_ms * u64::from(factor))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        serde_json::from_str("{}").unwrap()
    }
}
