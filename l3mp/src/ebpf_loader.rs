//! eBPF program loading and the kernel-backed [`Datapath`].
//!
//! The classifier object is compiled separately in l3mp-programs and
//! installed next to the binary; this module loads it, verifies both entry
//! points up front and then serves attachment and map requests against it.

use aya::programs::SchedClassifier;
use aya::programs::tc::TcOptions;
use aya::{Bpf, BpfLoader};
use aya_log::BpfLogger;
use std::path::Path;
use tracing::{info, warn};

use crate::attach::{
    self, AttachmentHandle, Direction, EGRESS_PROGRAM, FILTER_HANDLE, FILTER_PRIORITY,
    INGRESS_PROGRAM,
};
use crate::datapath::Datapath;
use crate::device::Interface;
use crate::error::{Error, Result};
use crate::label::Label;
use crate::routing::{self, EgressSettings};

/// Default install path of the compiled classifier object.
pub const DEFAULT_PROGRAM_PATH: &str = "/usr/lib/l3mp/multiplex";

/// Loaded classifier object: both entry points plus the routing maps.
///
/// Dropping it unloads the programs and releases the maps.
pub struct EbpfDatapath {
    bpf: Bpf,
}

impl EbpfDatapath {
    /// Load the classifier object from `path` and verify both entry points.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut bpf = BpfLoader::new()
            .load_file(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

        if let Err(e) = BpfLogger::init(&mut bpf) {
            warn!(error = %e, "Failed to initialize eBPF logger");
        }

        for name in [INGRESS_PROGRAM, EGRESS_PROGRAM] {
            let prog: &mut SchedClassifier = bpf
                .program_mut(name)
                .ok_or_else(|| Error::Load(format!("program {name} not found")))?
                .try_into()
                .map_err(|e| Error::Load(format!("program {name}: {e}")))?;
            prog.load()
                .map_err(|e| Error::Load(format!("program {name}: {e}")))?;
        }

        info!(path = %path.display(), "Classifier programs loaded");
        Ok(Self { bpf })
    }

    fn program_mut(&mut self, iface: &str, direction: Direction) -> Result<&mut SchedClassifier> {
        let name = direction.program_name();
        self.bpf
            .program_mut(name)
            .ok_or_else(|| Error::attach(iface, direction, format!("program {name} not found")))?
            .try_into()
            .map_err(|e| Error::attach(iface, direction, e))
    }
}

impl Datapath for EbpfDatapath {
    fn attach(&mut self, iface: &Interface, direction: Direction) -> Result<AttachmentHandle> {
        attach::ensure_clsact(&iface.name, direction)?;
        attach::remove_stale_filter(&iface.name, direction);

        let prog = self.program_mut(&iface.name, direction)?;
        let link = prog
            .attach_with_options(
                &iface.name,
                direction.attach_type(),
                TcOptions {
                    priority: FILTER_PRIORITY,
                    handle: FILTER_HANDLE,
                },
            )
            .map_err(|e| Error::attach(&iface.name, direction, e))?;

        info!(if_name = %iface.name, if_index = iface.index, %direction, "TC program attached");
        Ok(AttachmentHandle::with_link(
            iface.index,
            &iface.name,
            direction,
            link,
        ))
    }

    fn detach(&mut self, handle: AttachmentHandle) -> Result<()> {
        let AttachmentHandle {
            if_index,
            if_name,
            direction,
            link,
        } = handle;

        if let Some(link) = link {
            let prog = self.program_mut(&if_name, direction)?;
            if let Err(e) = prog.detach(link) {
                // Removing the root below drops the filter anyway
                warn!(if_name = %if_name, %direction, error = %e, "Failed to detach TC program");
            }
        }

        attach::remove_clsact(&if_name)?;
        info!(if_name = %if_name, if_index, %direction, "TC program detached");
        Ok(())
    }

    fn set_destination(&mut self, label: Label, if_index: u32) -> Result<()> {
        routing::set_destination(&mut self.bpf, label, if_index)
    }

    fn remove_destination(&mut self, label: Label) -> Result<()> {
        routing::remove_destination(&mut self.bpf, label)
    }

    fn destination(&self, label: Label) -> Result<Option<u32>> {
        routing::destination(&self.bpf, label)
    }

    fn set_egress_settings(&mut self, if_index: u32, settings: EgressSettings) -> Result<()> {
        routing::set_egress_settings(&mut self.bpf, if_index, settings)
    }

    fn remove_egress_settings(&mut self, if_index: u32) -> Result<()> {
        routing::remove_egress_settings(&mut self.bpf, if_index)
    }

    fn egress_settings(&self, if_index: u32) -> Result<Option<EgressSettings>> {
        routing::egress_settings(&self.bpf, if_index)
    }
}
