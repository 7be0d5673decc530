//! Classifier attachment points (clsact root + ingress/egress filters).

use aya::programs::TcAttachType;
use aya::programs::tc::{self, SchedClassifierLinkId};
use std::fmt;
use std::io;
use std::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Filter priority for both classifiers.
pub const FILTER_PRIORITY: u16 = 1;

/// Filter handle for both classifiers.
pub const FILTER_HANDLE: u32 = 1;

/// Entry point names inside the classifier object.
pub const INGRESS_PROGRAM: &str = "ingress";
pub const EGRESS_PROGRAM: &str = "egress";

/// Traffic direction of an attachment point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn attach_type(self) -> TcAttachType {
        match self {
            Direction::Ingress => TcAttachType::Ingress,
            Direction::Egress => TcAttachType::Egress,
        }
    }

    /// Classifier entry point bound at this direction.
    pub fn program_name(self) -> &'static str {
        match self {
            Direction::Ingress => INGRESS_PROGRAM,
            Direction::Egress => EGRESS_PROGRAM,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => f.write_str("ingress"),
            Direction::Egress => f.write_str("egress"),
        }
    }
}

/// A classifier installed on a device, kept so it can be torn down.
#[derive(Debug)]
pub struct AttachmentHandle {
    pub if_index: u32,
    pub if_name: String,
    pub direction: Direction,
    pub(crate) link: Option<SchedClassifierLinkId>,
}

impl AttachmentHandle {
    /// Handle without a kernel link, for datapaths that track filters themselves.
    pub fn new(if_index: u32, if_name: &str, direction: Direction) -> Self {
        Self {
            if_index,
            if_name: if_name.to_string(),
            direction,
            link: None,
        }
    }

    pub(crate) fn with_link(
        if_index: u32,
        if_name: &str,
        direction: Direction,
        link: SchedClassifierLinkId,
    ) -> Self {
        Self {
            link: Some(link),
            ..Self::new(if_index, if_name, direction)
        }
    }
}

/// Add a clsact qdisc to `if_name`. An existing root is reused.
pub fn ensure_clsact(if_name: &str, direction: Direction) -> Result<()> {
    match tc::qdisc_add_clsact(if_name) {
        Ok(()) => {
            debug!(if_name, "clsact qdisc added");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists || e.to_string().contains("exists") => {
            debug!(if_name, "clsact qdisc already present, reusing");
            Ok(())
        }
        Err(e) => Err(Error::attach(if_name, direction, format!("clsact qdisc: {e}"))),
    }
}

/// Remove filters a previous run left at this attachment point.
pub fn remove_stale_filter(if_name: &str, direction: Direction) {
    let attach_type = direction.attach_type();
    match tc::qdisc_detach_program(if_name, attach_type, direction.program_name()) {
        Ok(()) => info!(if_name, %direction, "Removed stale filter from previous run"),
        Err(e) => debug!(if_name, %direction, error = %e, "No stale filter to remove"),
    }
}

/// Delete the clsact qdisc on `if_name`, dropping every filter attached to it.
pub fn remove_clsact(if_name: &str) -> Result<()> {
    let output = Command::new("tc")
        .args(["qdisc", "del", "dev", if_name, "clsact"])
        .output()
        .map_err(|e| Error::Teardown(if_name.to_string(), e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Root already gone, or the device itself
        if !is_absent(&stderr) {
            return Err(Error::Teardown(if_name.to_string(), stderr.trim().to_string()));
        }
    }

    debug!(if_name, "clsact qdisc removed");
    Ok(())
}

fn is_absent(stderr: &str) -> bool {
    stderr.contains("Cannot find device")
        || stderr.contains("Cannot find specified qdisc")
        || stderr.contains("No such file or directory")
        || stderr.contains("Invalid handle")
        || stderr.contains("Cannot delete qdisc with handle of zero")
}
