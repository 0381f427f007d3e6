//! Attaches a container to the overlay: allocates an address from the
//! daemon, wires the container into the per-VNI sandbox and registers the
//! result.

use std::net::IpAddr;
use std::os::fd::AsFd;

use log::debug;
use netlink_packet_route::{
    address::AddressAttribute, route::RouteAttribute, AddressFamily,
};

use crate::daemon::client::{DaemonClient, NetworksSetupContainerPayload};
use crate::error::{ErrorWrap, OverlayError, OverlayResult};
use crate::network::constants::{self, VXLAN_VETH_MTU};
use crate::network::links;
use crate::network::netlink::{self, LinkID, Route};
use crate::network::netns::Namespace;
use crate::network::types::{CniEnv, IpConfig, IpamResult, NetworkConfig};

pub struct Add {
    env: CniEnv,
}

impl Add {
    pub fn new(env: CniEnv) -> Self {
        Add { env }
    }

    /// Run the attach sequence. The address is allocated before any device
    /// exists so a failed allocation costs nothing; the container side is
    /// wired before the sandbox side so a partial failure still leaves the
    /// caller a routable interface; registration runs last so the daemon
    /// only ever records fully wired containers.
    pub fn exec(&self, conf: &NetworkConfig, vni: u32) -> OverlayResult<IpamResult> {
        if self.env.container_id.is_empty() {
            return Err(OverlayError::msg("CNI_CONTAINERID is required"));
        }

        let mut host_sock = netlink::Socket::new()?;
        let host_ip = get_host_ip(&mut host_sock)?;
        debug!("host address {}", host_ip);

        let daemon = DaemonClient::new(&conf.daemon_base_url);
        let ipam_result = daemon.allocate_ip(&conf.network_id, &self.env.container_id)?;
        let ip4 = match &ipam_result.ip4 {
            Some(ip4) => ip4.clone(),
            None => {
                return Err(OverlayError::msg(
                    "AllocateIP returned missing IPv4 config",
                ))
            }
        };
        debug!(
            "allocated {} via {} for {}",
            ip4.ip, ip4.gateway, self.env.container_id
        );

        let sandbox_ns =
            super::get_sandbox_ns(&constants::sandbox_name(vni)).wrap("getting vxlan sandbox")?;

        self.setup_container_ns(&sandbox_ns, &ip4)?;
        self.ensure_vxlan_device(&sandbox_ns, vni, &mut host_sock)?;
        self.setup_sandbox_ns(&sandbox_ns, vni, &ip4)?;

        let payload = NetworksSetupContainerPayload {
            args: self.env.args.clone(),
            container_namespace: self.env.netns_path.clone(),
            interface_name: self.env.ifname.clone(),
            vni,
            host_ip,
            ipam_result: ipam_result.clone(),
        };
        daemon
            .container_up(&conf.network_id, &self.env.container_id, &payload)
            .wrap("saving container data to store")?;

        Ok(ipam_result)
    }

    /// Create the veth pair inside the container namespace, move the host
    /// end into the sandbox by fd, and configure the container end.
    fn setup_container_ns(&self, sandbox_ns: &Namespace, ip4: &IpConfig) -> OverlayResult<()> {
        let container_ns = Namespace::new(&self.env.netns_path);
        let sandbox_file = sandbox_ns.open().wrap("opening sandbox namespace")?;

        container_ns.execute(|_| {
            let mut sock = netlink::Socket::new()?;

            let (host_end, container_end) = links::create_veth_pair(
                &mut sock,
                &self.env.container_id,
                &self.env.ifname,
                VXLAN_VETH_MTU,
            )?;

            sock.set_link_ns(host_end.header.index, sandbox_file.as_fd())
                .wrap("failed to move sandbox link into sandbox")?;

            sock.add_addr(container_end.header.index, &ip4.ip)
                .wrap("setting container address failed")?;

            sock.set_up(LinkID::ID(container_end.header.index))
                .wrap("failed to up container link")?;

            add_ipam_routes(&mut sock, container_end.header.index, ip4)
        })
    }

    /// Make sure the per-VNI vxlan device sits in the sandbox. The device
    /// can only be created in a namespace with a running UDP stack plus the
    /// host's VTEP address, so it is born in the host namespace and then
    /// moved in by fd.
    fn ensure_vxlan_device(
        &self,
        sandbox_ns: &Namespace,
        vni: u32,
        host_sock: &mut netlink::Socket,
    ) -> OverlayResult<()> {
        let vxlan_name = constants::vxlan_device_name(vni);

        let existing = sandbox_ns
            .execute(|_| {
                let mut sock = netlink::Socket::new()?;
                links::find_link(&mut sock, &vxlan_name)
            })
            .wrap("failed attempting to find vxlan device in sandbox")?;

        if existing.is_some() {
            return Ok(());
        }

        let vxlan = links::create_vxlan(host_sock, &vxlan_name, vni, VXLAN_VETH_MTU)
            .wrap("creating vxlan device on host namespace")?;

        let sandbox_file = sandbox_ns.open().wrap("opening sandbox namespace")?;
        host_sock
            .set_link_ns(vxlan.header.index, sandbox_file.as_fd())
            .wrap("moving vxlan device into sandbox")
    }

    /// Bring the sandbox-side devices up and hang them off the shared
    /// bridge, creating the bridge on first attach.
    fn setup_sandbox_ns(
        &self,
        sandbox_ns: &Namespace,
        vni: u32,
        ip4: &IpConfig,
    ) -> OverlayResult<()> {
        let vxlan_name = constants::vxlan_device_name(vni);
        let bridge_name = constants::bridge_device_name(vni);

        sandbox_ns.execute(|_| {
            let mut sock = netlink::Socket::new()?;

            let vxlan = sock
                .get_link(LinkID::Name(vxlan_name.clone()))
                .wrap("finding vxlan device within sandbox")?;
            sock.set_up(LinkID::ID(vxlan.header.index))
                .wrap("upping vxlan device")?;

            // the moved host end got a new index on the namespace transfer,
            // resolve it again by name
            let host_end = sock
                .get_link(LinkID::Name(self.env.container_id.clone()))
                .wrap("find sandbox veth end by name")?;
            sock.set_up(LinkID::ID(host_end.header.index))
                .wrap("upping sandbox veth end")?;

            let bridge = match links::find_link(&mut sock, &bridge_name)? {
                Some(bridge) => bridge,
                None => {
                    let addr = ipnet::Ipv4Net::new(ip4.gateway, ip4.ip.prefix_len())?;
                    links::create_bridge(&mut sock, &bridge_name, &addr)
                        .wrap("failed to create bridge")?
                }
            };

            sock.set_link_master(vxlan.header.index, bridge.header.index)
                .wrap("slaving vxlan to bridge")?;
            sock.set_link_master(host_end.header.index, bridge.header.index)
                .wrap("slaving veth end to bridge")
        })
    }
}

/// Program the IPAM routes on the container end. A route the kernel already
/// has is accepted as success; everything else is fatal.
pub fn add_ipam_routes(
    sock: &mut netlink::Socket,
    link: u32,
    ip4: &IpConfig,
) -> OverlayResult<()> {
    for r in &ip4.routes {
        let route = Route {
            dest: r.dst,
            gw: r.gw.unwrap_or(ip4.gateway),
            link,
        };

        if let Err(err) = sock.add_route(&route) {
            if let OverlayError::Netlink(e) = err.unwrap() {
                if -e.raw_code() == libc::EEXIST {
                    continue;
                }
            }
            return Err(err).wrap(format!(
                "adding route to {} via {} failed",
                route.dest, route.gw
            ));
        }
    }
    Ok(())
}

/// Resolve the host's VTEP address: the first IPv4 address of the link the
/// default route points out of, in CIDR form.
fn get_host_ip(sock: &mut netlink::Socket) -> OverlayResult<String> {
    let routes = sock.dump_routes().wrap("route list failed")?;

    let mut link_index = 0;
    for route in routes {
        if route.header.address_family != AddressFamily::Inet {
            continue;
        }

        let mut dest = false;
        let mut src = false;
        let mut oif = 0;
        for nla in &route.attributes {
            match nla {
                RouteAttribute::Destination(_) => dest = true,
                RouteAttribute::Source(_) | RouteAttribute::PrefSource(_) => src = true,
                RouteAttribute::Oif(idx) => oif = *idx,
                _ => {}
            }
        }

        // a route without destination and source is the default route
        if !dest && !src && oif > 0 {
            link_index = oif;
        }
    }

    if link_index == 0 {
        return Err(OverlayError::msg("failed to get default route interface"));
    }

    let link = sock
        .get_link(LinkID::ID(link_index))
        .wrap("link by index failed")?;
    let name = links::link_name(&link).unwrap_or_default().to_string();

    let addresses = sock.dump_addresses().wrap("error getting addrs")?;
    for addr in addresses {
        if addr.header.index != link_index || addr.header.family != AddressFamily::Inet {
            continue;
        }
        for nla in &addr.attributes {
            if let AddressAttribute::Local(IpAddr::V4(ip)) = nla {
                return Ok(format!("{}/{}", ip, addr.header.prefix_len));
            }
        }
    }

    Err(OverlayError::Message(format!(
        "no addrs found for interface: {}",
        name
    )))
}
