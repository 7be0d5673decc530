//! Errors raised by the attachment and label-routing control plane.

use std::io;
use thiserror::Error;

use crate::attach::Direction;

/// Control-plane errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Interface '{0}' not found")]
    NotFound(String),

    #[error("Failed to create interface '{name}': {source}")]
    CreationFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to attach {direction} classifier to '{iface}': {reason}")]
    AttachFailed {
        iface: String,
        direction: Direction,
        reason: String,
    },

    #[error("Invalid label {0} (must be 0..=16 and not already registered)")]
    InvalidLabel(i64),

    #[error("No external interface bound")]
    NoExternalInterface,

    #[error("Failed to write map {map}: {reason}")]
    MapWriteFailed { map: &'static str, reason: String },

    #[error("Failed to load classifier program: {0}")]
    Load(String),

    #[error("Netlink error on '{0}': {1}")]
    Netlink(String, io::Error),

    #[error("Teardown of '{0}' failed: {1}")]
    Teardown(String, String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn attach(iface: &str, direction: Direction, reason: impl ToString) -> Self {
        Error::AttachFailed {
            iface: iface.to_string(),
            direction,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn map_write(map: &'static str, reason: impl ToString) -> Self {
        Error::MapWriteFailed {
            map,
            reason: reason.to_string(),
        }
    }
}
