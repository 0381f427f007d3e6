//! JSON/HTTP client for the overlay daemon, the system of record for
//! address assignment and container registration.

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::error::{OverlayError, OverlayResult};
use crate::network::types::IpamResult;

pub struct DaemonClient {
    base_url: String,
    client: Client,
}

/// Body of the ContainerUp registration call.
#[derive(Debug, Clone, Serialize)]
pub struct NetworksSetupContainerPayload {
    pub args: String,
    pub container_namespace: String,
    pub interface_name: String,
    pub vni: u32,
    pub host_ip: String,
    pub ipam_result: IpamResult,
}

/// Body of the ContainerDown call.
#[derive(Debug, Clone, Serialize)]
pub struct NetworksDeleteContainerPayload {
    pub container_namespace: String,
    pub interface_name: String,
    pub vni: u32,
}

impl DaemonClient {
    /// The client performs no retries and inherits the default (unbounded)
    /// request timeout; an invocation runs to completion or fails.
    pub fn new(base_url: &str) -> DaemonClient {
        DaemonClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn allocate_ip(&self, network_id: &str, container_id: &str) -> OverlayResult<IpamResult> {
        let url = format!("{}/ipam/{}/{}", self.base_url, network_id, container_id);
        debug!("AllocateIP {}", url);

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()?;
        expect_status("AllocateIP", 201, resp.status().as_u16())?;

        Ok(resp.json()?)
    }

    pub fn release_ip(&self, network_id: &str, container_id: &str) -> OverlayResult<()> {
        let url = format!("{}/ipam/{}/{}", self.base_url, network_id, container_id);
        debug!("ReleaseIP {}", url);

        let resp = self
            .client
            .delete(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()?;
        expect_status("ReleaseIP", 204, resp.status().as_u16())
    }

    pub fn container_up(
        &self,
        network_id: &str,
        container_id: &str,
        payload: &NetworksSetupContainerPayload,
    ) -> OverlayResult<()> {
        let url = format!("{}/networks/{}/{}", self.base_url, network_id, container_id);
        debug!("ContainerUp {}", url);

        let resp = self.client.post(&url).json(payload).send()?;
        expect_status("ContainerUp", 201, resp.status().as_u16())
    }

    pub fn container_down(
        &self,
        network_id: &str,
        container_id: &str,
        payload: &NetworksDeleteContainerPayload,
    ) -> OverlayResult<()> {
        let url = format!("{}/networks/{}/{}", self.base_url, network_id, container_id);
        debug!("ContainerDown {}", url);

        let resp = self.client.delete(&url).json(payload).send()?;
        expect_status("ContainerDown", 204, resp.status().as_u16())
    }
}

fn expect_status(op: &'static str, want: u16, got: u16) -> OverlayResult<()> {
    if got != want {
        return Err(OverlayError::UnexpectedStatus { op, want, got });
    }
    Ok(())
}
