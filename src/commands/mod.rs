use std::env;

use crate::error::{ErrorWrap, OverlayError, OverlayResult};
use crate::network::constants::SANDBOX_REPO_ENV;
use crate::network::netns::{Namespace, Repository};

pub mod add;
pub mod del;

/// Open the host-global sandbox repository named by the environment.
fn get_sandbox_repo() -> OverlayResult<Repository> {
    let dir = env::var(SANDBOX_REPO_ENV).unwrap_or_default();
    if dir.is_empty() {
        return Err(OverlayError::Message(format!(
            "{} is required",
            SANDBOX_REPO_ENV
        )));
    }

    Repository::new(dir).wrap("failed to create sandbox repository")
}

/// Look up the sandbox namespace for a VNI, creating it on first attach.
/// The repository's exclusive-create keeps two racing first attaches from
/// both building it.
fn get_sandbox_ns(name: &str) -> OverlayResult<Namespace> {
    let repo = get_sandbox_repo()?;
    match repo.get(name) {
        Ok(ns) => Ok(ns),
        Err(_) => repo.create(name),
    }
}
