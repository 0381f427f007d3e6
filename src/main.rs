use std::ffi::OsString;

use clap::Parser;

use overlay_cni::commands::{add, del};
use overlay_cni::error::OverlayError;
use overlay_cni::network::constants;
use overlay_cni::network::types::{CniEnv, Command, NetworkConfig};

#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// Instead of reading from STDIN, read the configuration to be applied from the given file.
    #[clap(short, long)]
    file: Option<OsString>,
}

fn main() {
    env_logger::builder().format_timestamp(None).init();
    let opts = Opts::parse();

    match run(opts) {
        Ok(Some(result)) => println!("{}", result),
        Ok(None) => {}
        Err(err) => {
            err.print_json();
            std::process::exit(err.get_exit_code());
        }
    }
}

fn run(opts: Opts) -> Result<Option<String>, OverlayError> {
    let env = CniEnv::from_env()?;
    let conf = NetworkConfig::load(opts.file)?;

    match env.command {
        Command::Add => {
            let result = add::Add::new(env).exec(&conf, constants::VNI)?;
            Ok(Some(serde_json::to_string(&result)?))
        }
        Command::Del => {
            del::Del::new(env).exec(&conf, constants::VNI)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod test;
