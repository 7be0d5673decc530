//! Label routing table and egress settings, as stored in the classifier's maps.
//!
//! The ingress classifier on the external interface looks the packet's label
//! up in `INGRESS_DESTINATIONS` to find the managed interface to redirect to.
//! The egress classifier on a managed interface looks its own ifindex up in
//! `EGRESS_SETTINGS` to learn which label to stamp and where to send it.

use aya::Bpf;
use aya::maps::{HashMap, MapData, MapError};

use crate::error::{Error, Result};
use crate::label::Label;

/// Label -> managed interface index.
pub const INGRESS_DESTINATIONS: &str = "INGRESS_DESTINATIONS";

/// Managed interface index -> egress settings.
pub const EGRESS_SETTINGS: &str = "EGRESS_SETTINGS";

/// Egress configuration for one managed interface.
/// Must match the eBPF struct exactly.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EgressSettings {
    /// Interface index of the external interface
    pub external_ifindex: u32,
    /// Label stamped into outgoing packets
    pub label: u32,
}

impl EgressSettings {
    pub fn new(external_ifindex: u32, label: Label) -> Self {
        Self {
            external_ifindex,
            label: label.key(),
        }
    }
}

unsafe impl aya::Pod for EgressSettings {}

fn destinations_mut(bpf: &mut Bpf) -> Result<HashMap<&mut MapData, u32, u32>> {
    bpf.map_mut(INGRESS_DESTINATIONS)
        .ok_or_else(|| Error::map_write(INGRESS_DESTINATIONS, "map not found"))?
        .try_into()
        .map_err(|e: MapError| Error::map_write(INGRESS_DESTINATIONS, e))
}

fn settings_mut(bpf: &mut Bpf) -> Result<HashMap<&mut MapData, u32, EgressSettings>> {
    bpf.map_mut(EGRESS_SETTINGS)
        .ok_or_else(|| Error::map_write(EGRESS_SETTINGS, "map not found"))?
        .try_into()
        .map_err(|e: MapError| Error::map_write(EGRESS_SETTINGS, e))
}

pub fn set_destination(bpf: &mut Bpf, label: Label, if_index: u32) -> Result<()> {
    destinations_mut(bpf)?
        .insert(label.key(), if_index, 0)
        .map_err(|e| Error::map_write(INGRESS_DESTINATIONS, e))
}

pub fn remove_destination(bpf: &mut Bpf, label: Label) -> Result<()> {
    match destinations_mut(bpf)?.remove(&label.key()) {
        Ok(()) | Err(MapError::KeyNotFound) => Ok(()),
        Err(e) => Err(Error::map_write(INGRESS_DESTINATIONS, e)),
    }
}

pub fn destination(bpf: &Bpf, label: Label) -> Result<Option<u32>> {
    let map: HashMap<&MapData, u32, u32> = bpf
        .map(INGRESS_DESTINATIONS)
        .ok_or_else(|| Error::map_write(INGRESS_DESTINATIONS, "map not found"))?
        .try_into()
        .map_err(|e: MapError| Error::map_write(INGRESS_DESTINATIONS, e))?;

    match map.get(&label.key(), 0) {
        Ok(v) => Ok(Some(v)),
        Err(MapError::KeyNotFound) => Ok(None),
        Err(e) => Err(Error::map_write(INGRESS_DESTINATIONS, e)),
    }
}

pub fn set_egress_settings(bpf: &mut Bpf, if_index: u32, settings: EgressSettings) -> Result<()> {
    settings_mut(bpf)?
        .insert(if_index, settings, 0)
        .map_err(|e| Error::map_write(EGRESS_SETTINGS, e))
}

pub fn remove_egress_settings(bpf: &mut Bpf, if_index: u32) -> Result<()> {
    match settings_mut(bpf)?.remove(&if_index) {
        Ok(()) | Err(MapError::KeyNotFound) => Ok(()),
        Err(e) => Err(Error::map_write(EGRESS_SETTINGS, e)),
    }
}

pub fn egress_settings(bpf: &Bpf, if_index: u32) -> Result<Option<EgressSettings>> {
    let map: HashMap<&MapData, u32, EgressSettings> = bpf
        .map(EGRESS_SETTINGS)
        .ok_or_else(|| Error::map_write(EGRESS_SETTINGS, "map not found"))?
        .try_into()
        .map_err(|e: MapError| Error::map_write(EGRESS_SETTINGS, e))?;

    match map.get(&if_index, 0) {
        Ok(v) => Ok(Some(v)),
        Err(MapError::KeyNotFound) => Ok(None),
        Err(e) => Err(Error::map_write(EGRESS_SETTINGS, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_layout() {
        // Two u32 fields, no padding: the kernel side reads 8 bytes
        assert_eq!(std::mem::size_of::<EgressSettings>(), 8);
        assert_eq!(std::mem::align_of::<EgressSettings>(), 4);
    }

    #[test]
    fn test_settings_from_label() {
        let s = EgressSettings::new(3, Label::new(12).unwrap());
        assert_eq!(s.external_ifindex, 3);
        assert_eq!(s.label, 12);
    }
}
