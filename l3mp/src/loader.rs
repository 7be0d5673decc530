//! Loader: sequences classifier attachment and routing-table updates.
//!
//! The external interface must be bound (ingress classifier attached) before
//! any managed interface can be registered. Every attachment made here is
//! tracked and released again by [`Loader::release_managed`] or
//! [`Loader::close`].

use std::collections::BTreeMap;
use std::mem;
use tracing::{debug, info, warn};

use crate::attach::{AttachmentHandle, Direction};
use crate::datapath::Datapath;
use crate::device::Interface;
use crate::error::{Error, Result};
use crate::label::{Label, MAX_LABEL};
use crate::routing::EgressSettings;

enum State {
    Uninitialized,
    ExternalBound {
        external: Interface,
        handle: AttachmentHandle,
    },
}

struct ManagedEntry {
    iface: Interface,
    label: Label,
    handle: AttachmentHandle,
}

/// Owns the datapath and every attachment made through it.
pub struct Loader<D: Datapath> {
    datapath: D,
    state: State,
    /// Registered managed interfaces, keyed by ifindex
    managed: BTreeMap<u32, ManagedEntry>,
    max_label: u8,
}

impl<D: Datapath> Loader<D> {
    pub fn new(datapath: D) -> Self {
        Self {
            datapath,
            state: State::Uninitialized,
            managed: BTreeMap::new(),
            max_label: MAX_LABEL,
        }
    }

    /// Lower the highest label accepted by [`Loader::apply_to_managed`].
    /// Values above [`MAX_LABEL`] are clamped.
    pub fn set_max_label(&mut self, max_label: u8) {
        self.max_label = max_label.min(MAX_LABEL);
    }

    pub fn max_label(&self) -> u8 {
        self.max_label
    }

    pub fn datapath(&self) -> &D {
        &self.datapath
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::ExternalBound { .. })
    }

    /// The bound external interface, if any.
    pub fn external(&self) -> Option<&Interface> {
        match &self.state {
            State::ExternalBound { external, .. } => Some(external),
            State::Uninitialized => None,
        }
    }

    /// Registered managed interfaces and their labels, ordered by ifindex.
    pub fn managed_labels(&self) -> impl Iterator<Item = (&Interface, Label)> {
        self.managed.values().map(|e| (&e.iface, e.label))
    }

    /// Attach the ingress classifier to the external interface.
    ///
    /// Re-applying replaces the previous external attachment. If the attach
    /// fails the loader is left unbound. Once bound, the egress settings of
    /// every managed device are re-pointed at `device`; a device whose
    /// settings cannot be written is skipped and the first such error is
    /// returned, with the new binding kept.
    pub fn apply_external(&mut self, device: &Interface) -> Result<()> {
        if let State::ExternalBound { external, handle } =
            mem::replace(&mut self.state, State::Uninitialized)
        {
            info!(if_name = %external.name, "Replacing external attachment");
            if let Err(e) = self.datapath.detach(handle) {
                warn!(if_name = %external.name, error = %e, "Failed to remove previous external attachment");
            }
        }

        let handle = self.datapath.attach(device, Direction::Ingress)?;
        self.state = State::ExternalBound {
            external: device.clone(),
            handle,
        };
        info!(if_name = %device.name, if_index = device.index, "External interface bound");

        let mut first_error = None;
        for entry in self.managed.values() {
            let settings = EgressSettings::new(device.index, entry.label);
            let index = entry.iface.index;
            if let Err(e) = self.datapath.set_egress_settings(index, settings) {
                warn!(if_name = %entry.iface.name, error = %e, "Failed to re-point egress settings");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Register `device` under `label`: routing entry, egress classifier and
    /// egress settings, in that order.
    ///
    /// Nothing is touched if validation fails. If a later step fails, the
    /// earlier steps of this call are undone. A device that is already
    /// registered keeps its egress classifier and only moves to the new
    /// label; if that fails its previous registration stays in place.
    pub fn apply_to_managed(&mut self, device: &Interface, label: i64) -> Result<()> {
        let label = Label::new(label)?;
        if label.get() > self.max_label {
            return Err(Error::InvalidLabel(label.get() as i64));
        }
        let external_index = match &self.state {
            State::ExternalBound { external, .. } => external.index,
            State::Uninitialized => return Err(Error::NoExternalInterface),
        };

        if let Some(holder) = self
            .managed
            .values()
            .find(|e| e.label == label && e.iface.index != device.index)
        {
            warn!(%label, holder = %holder.iface.name, if_name = %device.name, "Label already registered");
            return Err(Error::InvalidLabel(label.get() as i64));
        }

        if let Some(previous) = self.managed.get(&device.index).map(|e| e.label) {
            return self.relabel(device, previous, label, external_index);
        }

        self.datapath.set_destination(label, device.index)?;

        let handle = match self.datapath.attach(device, Direction::Egress) {
            Ok(h) => h,
            Err(e) => {
                self.undo_destination(label);
                return Err(e);
            }
        };

        let settings = EgressSettings::new(external_index, label);
        if let Err(e) = self.datapath.set_egress_settings(device.index, settings) {
            if let Err(detach_err) = self.datapath.detach(handle) {
                warn!(if_name = %device.name, error = %detach_err, "Rollback: failed to detach egress classifier");
            }
            self.undo_destination(label);
            return Err(e);
        }

        self.managed.insert(
            device.index,
            ManagedEntry {
                iface: device.clone(),
                label,
                handle,
            },
        );
        info!(if_name = %device.name, if_index = device.index, %label, "Managed interface registered");
        Ok(())
    }

    /// Undo the registration of `device`. Call before deleting the device.
    ///
    /// Every step is attempted; the first failure is returned.
    pub fn release_managed(&mut self, device: &Interface) -> Result<()> {
        match self.managed.remove(&device.index) {
            Some(entry) => self.release_entry(entry).into_iter().next().map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    /// Release every attachment and the datapath itself.
    ///
    /// Safe to call in any state. Failures are logged and returned, never
    /// escalated.
    pub fn close(mut self) -> Vec<Error> {
        let mut errors = Vec::new();

        let managed = mem::take(&mut self.managed);
        for (_, entry) in managed.into_iter().rev() {
            errors.extend(self.release_entry(entry));
        }

        if let State::ExternalBound { external, handle } =
            mem::replace(&mut self.state, State::Uninitialized)
        {
            if let Err(e) = self.datapath.detach(handle) {
                warn!(if_name = %external.name, error = %e, "Failed to remove external attachment");
                errors.push(e);
            }
        }

        info!(failures = errors.len(), "Loader closed");
        errors
    }

    fn relabel(
        &mut self,
        device: &Interface,
        previous: Label,
        label: Label,
        external_index: u32,
    ) -> Result<()> {
        debug!(if_name = %device.name, from = %previous, to = %label, "Re-registering managed interface");
        let moved = label != previous;

        if moved {
            self.datapath.set_destination(label, device.index)?;
        }

        let settings = EgressSettings::new(external_index, label);
        if let Err(e) = self.datapath.set_egress_settings(device.index, settings) {
            if moved {
                self.undo_destination(label);
            }
            return Err(e);
        }

        if moved && let Err(e) = self.datapath.remove_destination(previous) {
            warn!(if_name = %device.name, label = %previous, error = %e, "Failed to remove old routing entry");
        }

        if let Some(entry) = self.managed.get_mut(&device.index) {
            entry.iface = device.clone();
            entry.label = label;
        }
        info!(if_name = %device.name, if_index = device.index, %label, "Managed interface re-registered");
        Ok(())
    }

    fn release_entry(&mut self, entry: ManagedEntry) -> Vec<Error> {
        let ManagedEntry {
            iface,
            label,
            handle,
        } = entry;
        let mut errors = Vec::new();

        if let Err(e) = self.datapath.remove_egress_settings(iface.index) {
            warn!(if_name = %iface.name, error = %e, "Failed to remove egress settings");
            errors.push(e);
        }
        if let Err(e) = self.datapath.detach(handle) {
            warn!(if_name = %iface.name, error = %e, "Failed to detach egress classifier");
            errors.push(e);
        }
        if let Err(e) = self.datapath.remove_destination(label) {
            warn!(if_name = %iface.name, %label, error = %e, "Failed to remove routing entry");
            errors.push(e);
        }

        debug!(if_name = %iface.name, %label, "Managed interface released");
        errors
    }

    fn undo_destination(&mut self, label: Label) {
        if let Err(e) = self.datapath.remove_destination(label) {
            warn!(%label, error = %e, "Rollback: failed to remove routing entry");
        }
    }
}
