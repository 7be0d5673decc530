//! In-memory [`Datapath`] recording roots, filters and map contents.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::attach::{AttachmentHandle, Direction};
use crate::datapath::Datapath;
use crate::device::Interface;
use crate::error::{Error, Result};
use crate::label::{LABEL_CAPACITY, Label};
use crate::routing::{EGRESS_SETTINGS, EgressSettings, INGRESS_DESTINATIONS};

/// A clsact root and the filters bound to it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Root {
    pub ingress: Option<&'static str>,
    pub egress: Option<&'static str>,
}

impl Root {
    pub fn filter_count(&self) -> usize {
        self.ingress.is_some() as usize + self.egress.is_some() as usize
    }
}

/// Kernel-side state as seen by the fake.
#[derive(Debug, Default)]
pub struct FakeKernel {
    /// clsact roots by ifindex
    pub roots: BTreeMap<u32, Root>,
    /// Number of times a root had to be created
    pub roots_created: usize,
    pub destinations: BTreeMap<u32, u32>,
    pub egress_settings: BTreeMap<u32, EgressSettings>,
    /// Total number of successful mutations
    pub mutations: usize,
    /// Attaching to this interface name fails
    pub fail_attach: Option<String>,
    /// Writes to the settings map fail
    pub fail_settings: bool,
    /// Writes to the settings map fail for this managed ifindex only
    pub fail_settings_for: Option<u32>,
    /// Set once the datapath has been dropped
    pub released: bool,
}

/// [`Datapath`] backed by a shared [`FakeKernel`].
pub struct FakeDatapath {
    kernel: Arc<Mutex<FakeKernel>>,
}

impl FakeDatapath {
    pub fn new() -> Self {
        Self {
            kernel: Arc::new(Mutex::new(FakeKernel::default())),
        }
    }

    /// Shared handle to the kernel state, usable after the datapath moved.
    pub fn kernel(&self) -> Arc<Mutex<FakeKernel>> {
        Arc::clone(&self.kernel)
    }

    fn lock(&self) -> MutexGuard<'_, FakeKernel> {
        self.kernel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FakeDatapath {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FakeDatapath {
    fn drop(&mut self) {
        self.lock().released = true;
    }
}

impl Datapath for FakeDatapath {
    fn attach(&mut self, iface: &Interface, direction: Direction) -> Result<AttachmentHandle> {
        let mut k = self.lock();
        if k.fail_attach.as_deref() == Some(iface.name.as_str()) {
            return Err(Error::AttachFailed {
                iface: iface.name.clone(),
                direction,
                reason: "injected failure".to_string(),
            });
        }

        if !k.roots.contains_key(&iface.index) {
            k.roots_created += 1;
        }
        let root = k.roots.entry(iface.index).or_default();
        match direction {
            Direction::Ingress => root.ingress = Some(direction.program_name()),
            Direction::Egress => root.egress = Some(direction.program_name()),
        }
        k.mutations += 1;

        Ok(AttachmentHandle::new(iface.index, &iface.name, direction))
    }

    fn detach(&mut self, handle: AttachmentHandle) -> Result<()> {
        let mut k = self.lock();
        if k.roots.remove(&handle.if_index).is_some() {
            k.mutations += 1;
        }
        Ok(())
    }

    fn set_destination(&mut self, label: Label, if_index: u32) -> Result<()> {
        let mut k = self.lock();
        if !k.destinations.contains_key(&label.key())
            && k.destinations.len() as u32 >= LABEL_CAPACITY
        {
            return Err(Error::map_write(INGRESS_DESTINATIONS, "map full"));
        }
        k.destinations.insert(label.key(), if_index);
        k.mutations += 1;
        Ok(())
    }

    fn remove_destination(&mut self, label: Label) -> Result<()> {
        let mut k = self.lock();
        if k.destinations.remove(&label.key()).is_some() {
            k.mutations += 1;
        }
        Ok(())
    }

    fn destination(&self, label: Label) -> Result<Option<u32>> {
        Ok(self.lock().destinations.get(&label.key()).copied())
    }

    fn set_egress_settings(&mut self, if_index: u32, settings: EgressSettings) -> Result<()> {
        let mut k = self.lock();
        if k.fail_settings || k.fail_settings_for == Some(if_index) {
            return Err(Error::map_write(EGRESS_SETTINGS, "injected failure"));
        }
        k.egress_settings.insert(if_index, settings);
        k.mutations += 1;
        Ok(())
    }

    fn remove_egress_settings(&mut self, if_index: u32) -> Result<()> {
        let mut k = self.lock();
        if k.egress_settings.remove(&if_index).is_some() {
            k.mutations += 1;
        }
        Ok(())
    }

    fn egress_settings(&self, if_index: u32) -> Result<Option<EgressSettings>> {
        Ok(self.lock().egress_settings.get(&if_index).copied())
    }
}
