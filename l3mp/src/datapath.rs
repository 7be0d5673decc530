//! The seam between the Loader and the kernel datapath.

use crate::attach::{AttachmentHandle, Direction};
use crate::device::Interface;
use crate::error::Result;
use crate::label::Label;
use crate::routing::EgressSettings;

/// Classifier attachment and routing-table access.
///
/// Implemented by [`crate::ebpf_loader::EbpfDatapath`] for the real kernel;
/// all calls block until the kernel has answered.
pub trait Datapath {
    /// Install the classifier entry point for `direction` on `iface`,
    /// replacing whatever a previous run left there.
    fn attach(&mut self, iface: &Interface, direction: Direction) -> Result<AttachmentHandle>;

    /// Remove the filter and the clsact root behind `handle`.
    fn detach(&mut self, handle: AttachmentHandle) -> Result<()>;

    fn set_destination(&mut self, label: Label, if_index: u32) -> Result<()>;

    fn remove_destination(&mut self, label: Label) -> Result<()>;

    fn destination(&self, label: Label) -> Result<Option<u32>>;

    fn set_egress_settings(&mut self, if_index: u32, settings: EgressSettings) -> Result<()>;

    fn remove_egress_settings(&mut self, if_index: u32) -> Result<()>;

    fn egress_settings(&self, if_index: u32) -> Result<Option<EgressSettings>>;
}
