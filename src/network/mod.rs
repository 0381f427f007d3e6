pub mod constants;
pub mod links;
pub mod netlink;
pub mod netns;
pub mod types;

use std::{
    ffi::OsString,
    fs::File,
    io::{self, BufReader},
};

use crate::{
    error::{OverlayError, OverlayResult},
    wrap,
};

impl types::NetworkConfig {
    pub fn load(path: Option<OsString>) -> OverlayResult<types::NetworkConfig> {
        let conf: types::NetworkConfig = wrap!(Self::load_inner(path), "failed to load netconf")?;
        conf.validate()?;
        Ok(conf)
    }

    fn load_inner(path: Option<OsString>) -> Result<types::NetworkConfig, io::Error> {
        let conf = match path {
            Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?)),
            None => serde_json::from_reader(io::stdin()),
        }?;
        Ok(conf)
    }
}
