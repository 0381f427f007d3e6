//! Detaches a container from the overlay and tears the per-VNI sandbox
//! down once the last veth end is gone.
//!
//! Daemon calls run first so a daemon failure aborts before any host
//! mutation; the flow never rolls back, a rerun of DEL is the recovery
//! path for partial state.

use log::debug;

use crate::daemon::client::{DaemonClient, NetworksDeleteContainerPayload};
use crate::error::{ErrorWrap, OverlayResult};
use crate::network::constants;
use crate::network::links;
use crate::network::netlink;
use crate::network::netns::Namespace;
use crate::network::types::{CniEnv, NetworkConfig};

pub struct Del {
    env: CniEnv,
}

impl Del {
    pub fn new(env: CniEnv) -> Self {
        Del { env }
    }

    pub fn exec(&self, conf: &NetworkConfig, vni: u32) -> OverlayResult<()> {
        let daemon = DaemonClient::new(&conf.daemon_base_url);

        let payload = NetworksDeleteContainerPayload {
            container_namespace: self.env.netns_path.clone(),
            interface_name: self.env.ifname.clone(),
            vni,
        };
        daemon
            .container_down(&conf.network_id, &self.env.container_id, &payload)
            .wrap("removing container data from store")?;

        daemon
            .release_ip(&conf.network_id, &self.env.container_id)
            .wrap("releasing container address")?;

        let container_ns = Namespace::new(&self.env.netns_path);
        container_ns
            .execute(|_| {
                let mut sock = netlink::Socket::new()?;
                links::delete_link_by_name(&mut sock, &self.env.ifname)
            })
            .wrap("failed to delete link in container namespace")?;

        let repo = super::get_sandbox_repo().wrap("failed to open sandbox repository")?;
        let sandbox_ns = repo
            .get(&constants::sandbox_name(vni))
            .wrap("failed to get sandbox namespace")?;

        let sandbox_links = sandbox_ns
            .execute(|_| {
                let mut sock = netlink::Socket::new()?;
                links::list_links(&mut sock)
            })
            .wrap("failed to get sandbox links")?;

        // the sandbox refcount is the set of veth ends living in it; never
        // cached, always recomputed from the kernel
        for link in &sandbox_links {
            if links::link_is_veth(link) {
                debug!(
                    "sandbox {} still has attached containers",
                    sandbox_ns.path().display()
                );
                return Ok(());
            }
        }

        sandbox_ns
            .destroy()
            .wrap("failed to destroy sandbox namespace")
    }
}
