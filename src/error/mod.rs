use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type OverlayResult<T> = Result<T, OverlayError>;

/// wrap any result into a OverlayError and add the given msg
#[macro_export]
macro_rules! wrap {
    ($result:expr, $msg:expr) => {
        $result.map_err(|err| OverlayError::wrap($msg, err.into()))
    };
}

pub trait ErrorWrap<T> {
    /// wrap OverlayResult error into a OverlayError and add the given msg
    fn wrap<S>(self, msg: S) -> OverlayResult<T>
    where
        S: Into<String>;
}

impl<T> ErrorWrap<T> for OverlayResult<T> {
    fn wrap<S>(self, msg: S) -> OverlayResult<T>
    where
        S: Into<String>,
    {
        self.map_err(|err| OverlayError::wrap(msg, err))
    }
}

// The main overlay-cni error type
#[derive(Debug)]
pub enum OverlayError {
    // A string message
    Message(String),
    // A string message that sets a specific exit code
    ExitCode(String, i32),
    // A chain of multiple errors
    Chain(String, Box<OverlayError>),

    Io(std::io::Error),

    Serde(serde_json::Error),

    Netlink(netlink_packet_core::error::ErrorMessage),

    Http(reqwest::Error),

    // daemon replied but not with the status the contract demands
    UnexpectedStatus {
        op: &'static str,
        want: u16,
        got: u16,
    },
}

// Internal struct for JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub error: String,
}

impl OverlayError {
    pub fn msg<S>(msg: S) -> OverlayError
    where
        S: Into<String>,
    {
        OverlayError::Message(msg.into())
    }

    pub fn wrap<S>(msg: S, chained: OverlayError) -> OverlayError
    where
        S: Into<String>,
    {
        OverlayError::Chain(msg.into(), Box::new(chained))
    }

    // Print the error in a standardized JSON format recognized by the
    // runtime that invoked us.
    pub fn print_json(&self) {
        let to_json = JsonError {
            error: self.to_string(),
        };
        println!(
            "{}",
            serde_json::to_string(&to_json).unwrap_or(format!(
                "Failed to serialize error message: {}",
                to_json.error
            ))
        );
    }

    // Get the exit code that the plugin should exit with
    pub fn get_exit_code(&self) -> i32 {
        match *self {
            OverlayError::ExitCode(_, i) => i,
            _ => 1,
        }
    }

    /// unwrap the chain error recursively until we reach a non chain type error
    pub fn unwrap(&self) -> &OverlayError {
        match self {
            OverlayError::Chain(_, inner) => inner.unwrap(),
            _ => self,
        }
    }
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayError::Message(s) => write!(f, "{}", s),
            OverlayError::ExitCode(s, _) => write!(f, "{}", s),
            OverlayError::Chain(s, e) => write!(f, "{}: {}", s, e),
            OverlayError::Io(e) => write!(f, "IO error: {}", e),
            OverlayError::Serde(e) => write!(f, "JSON Decoding error: {}", e),
            OverlayError::Netlink(e) => write!(f, "Netlink error: {}", e),
            OverlayError::Http(e) => write!(f, "HTTP error: {}", e),
            OverlayError::UnexpectedStatus { op, want, got } => write!(
                f,
                "unexpected status code on {}: expected {} but got {}",
                op, want, got
            ),
        }
    }
}

impl Error for OverlayError {}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> OverlayError {
        OverlayError::Io(err)
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> OverlayError {
        OverlayError::Serde(err)
    }
}

impl From<netlink_packet_core::error::ErrorMessage> for OverlayError {
    fn from(err: netlink_packet_core::error::ErrorMessage) -> Self {
        OverlayError::Netlink(err)
    }
}

impl From<reqwest::Error> for OverlayError {
    fn from(err: reqwest::Error) -> Self {
        OverlayError::Http(err)
    }
}

impl From<nix::errno::Errno> for OverlayError {
    fn from(err: nix::errno::Errno) -> Self {
        OverlayError::Io(std::io::Error::from(err))
    }
}

impl From<ipnet::PrefixLenError> for OverlayError {
    fn from(e: ipnet::PrefixLenError) -> Self {
        OverlayError::Message(format!("{}", e))
    }
}
