use netlink_packet_route::link::{
    InfoData, InfoKind, InfoVeth, InfoVxlan, LinkAttribute, LinkInfo, LinkMessage,
};

use crate::error::{ErrorWrap, OverlayError, OverlayResult};
use crate::network::constants::{BRIDGE_MTU, VXLAN_UDP_PORT};
use crate::network::netlink::{self, CreateLinkOptions, LinkID};

/// Create a veth pair with both ends in the current namespace. The caller
/// is expected to run this inside the container namespace so the container
/// end is born there and the host end can be moved out afterwards.
///
/// Returns (host end, container end).
pub fn create_veth_pair(
    sock: &mut netlink::Socket,
    host_name: &str,
    container_name: &str,
    mtu: u32,
) -> OverlayResult<(LinkMessage, LinkMessage)> {
    let mut peer = LinkMessage::default();
    let mut peer_opts = CreateLinkOptions::new(host_name.to_string(), InfoKind::Veth);
    peer_opts.mtu = mtu;
    netlink::parse_create_link_options(&mut peer, peer_opts);

    let mut opts = CreateLinkOptions::new(container_name.to_string(), InfoKind::Veth);
    opts.mtu = mtu;
    opts.info_data = Some(InfoData::Veth(InfoVeth::Peer(peer)));

    sock.create_link(opts)
        .map_err(|err| OverlayError::wrap("could not create veth pair", err))?;

    let host = sock
        .get_link(LinkID::Name(host_name.to_string()))
        .wrap("get host veth end")?;
    let container = sock
        .get_link(LinkID::Name(container_name.to_string()))
        .wrap("get container veth end")?;

    Ok((host, container))
}

/// Create a bridge, assign it the given address and bring it up.
pub fn create_bridge(
    sock: &mut netlink::Socket,
    name: &str,
    addr: &ipnet::Ipv4Net,
) -> OverlayResult<LinkMessage> {
    let mut opts = CreateLinkOptions::new(name.to_string(), InfoKind::Bridge);
    opts.mtu = BRIDGE_MTU;
    sock.create_link(opts).wrap("create bridge")?;

    let bridge = sock
        .get_link(LinkID::Name(name.to_string()))
        .wrap("get bridge")?;

    sock.add_addr(bridge.header.index, addr)
        .wrap("add ip addr to bridge")?;
    sock.set_up(LinkID::ID(bridge.header.index))
        .wrap("set bridge up")?;

    Ok(bridge)
}

/// Create a VXLAN device and bring it up. Learning, proxy, l2miss and
/// l3miss stay on so a userspace peer watcher can service FDB/neighbor
/// misses.
pub fn create_vxlan(
    sock: &mut netlink::Socket,
    name: &str,
    vni: u32,
    mtu: u32,
) -> OverlayResult<LinkMessage> {
    let mut opts = CreateLinkOptions::new(name.to_string(), InfoKind::Vxlan);
    opts.mtu = mtu;
    opts.info_data = Some(InfoData::Vxlan(vec![
        InfoVxlan::Id(vni),
        // encoded big endian on the wire as the kernel expects
        InfoVxlan::Port(VXLAN_UDP_PORT),
        InfoVxlan::Learning(true),
        InfoVxlan::Proxy(true),
        InfoVxlan::L2Miss(true),
        InfoVxlan::L3Miss(true),
    ]));

    sock.create_link(opts).wrap("create vxlan device")?;

    let vxlan = sock
        .get_link(LinkID::Name(name.to_string()))
        .wrap("get vxlan device")?;
    sock.set_up(LinkID::ID(vxlan.header.index))
        .wrap("set vxlan device up")?;

    Ok(vxlan)
}

/// Look up a link by name. A missing link is not an error; callers use
/// `None` to drive create-if-missing logic.
pub fn find_link(sock: &mut netlink::Socket, name: &str) -> OverlayResult<Option<LinkMessage>> {
    match sock.get_link(LinkID::Name(name.to_string())) {
        Ok(link) => Ok(Some(link)),
        Err(err) => {
            if let OverlayError::Netlink(e) = err.unwrap() {
                if -e.raw_code() == libc::ENODEV {
                    return Ok(None);
                }
            }
            Err(err)
        }
    }
}

pub fn delete_link_by_name(sock: &mut netlink::Socket, name: &str) -> OverlayResult<()> {
    sock.del_link(LinkID::Name(name.to_string()))
}

pub fn list_links(sock: &mut netlink::Socket) -> OverlayResult<Vec<LinkMessage>> {
    sock.dump_links()
}

pub fn link_is_veth(link: &LinkMessage) -> bool {
    for nla in &link.attributes {
        if let LinkAttribute::LinkInfo(infos) = nla {
            for info in infos {
                if let LinkInfo::Kind(InfoKind::Veth) = info {
                    return true;
                }
            }
        }
    }
    false
}

pub fn link_name(link: &LinkMessage) -> Option<&str> {
    link.attributes.iter().find_map(|nla| {
        if let LinkAttribute::IfName(name) = nla {
            Some(name.as_str())
        } else {
            None
        }
    })
}
