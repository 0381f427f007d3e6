// Crate contains the types which are accepted by the vxlan plugin.

use std::env;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

/// Network configuration read from stdin. Unknown fields are ignored so a
/// runtime can pass through its full network document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// name of the network, informational
    #[serde(default)]
    pub name: String,
    /// plugin selector used by the runtime to pick this binary, informational
    #[serde(rename = "type", default)]
    pub net_type: String,
    /// identifies the overlay network to the daemon
    #[serde(default)]
    pub network_id: String,
    /// absolute HTTP base URL of the daemon
    #[serde(default)]
    pub daemon_base_url: String,
}

impl NetworkConfig {
    pub fn validate(&self) -> OverlayResult<()> {
        if self.network_id.is_empty() {
            return Err(OverlayError::msg(
                "\"network_id\" field is required. It identifies the network.",
            ));
        }
        if self.daemon_base_url.is_empty() {
            return Err(OverlayError::msg("\"daemon_base_url\" field required."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Del,
}

impl Command {
    fn parse(value: &str) -> OverlayResult<Command> {
        match value {
            "ADD" => Ok(Command::Add),
            "DEL" => Ok(Command::Del),
            other => Err(OverlayError::Message(format!(
                "unknown CNI_COMMAND {:?}",
                other
            ))),
        }
    }
}

/// The invocation envelope a CNI runtime passes via the environment.
#[derive(Debug, Clone)]
pub struct CniEnv {
    pub command: Command,
    pub container_id: String,
    pub netns_path: String,
    pub ifname: String,
    /// opaque pass-through, forwarded to the daemon untouched
    pub args: String,
}

impl CniEnv {
    pub fn from_env() -> OverlayResult<CniEnv> {
        let command = match env::var("CNI_COMMAND") {
            Ok(val) => Command::parse(&val)?,
            Err(_) => return Err(OverlayError::msg("CNI_COMMAND is required")),
        };

        let netns_path = env::var("CNI_NETNS").unwrap_or_default();
        if netns_path.is_empty() {
            return Err(OverlayError::msg("CNI_NETNS is required"));
        }

        let ifname = env::var("CNI_IFNAME").unwrap_or_default();
        if ifname.is_empty() {
            return Err(OverlayError::msg("CNI_IFNAME is required"));
        }

        Ok(CniEnv {
            command,
            // emptiness is checked by the ADD engine so the diagnostic
            // ordering matches the runtime contract
            container_id: env::var("CNI_CONTAINERID").unwrap_or_default(),
            netns_path,
            ifname,
            args: env::var("CNI_ARGS").unwrap_or_default(),
        })
    }
}

/// Address assignment returned by the daemon and echoed on stdout after a
/// successful attach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip4: Option<IpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpConfig {
    /// container address in CIDR form
    pub ip: Ipv4Net,
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub routes: Vec<IpamRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamRoute {
    pub dst: Ipv4Net,
    /// gateway override; the IPAM gateway applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<Ipv4Addr>,
}
