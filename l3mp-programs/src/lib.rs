#![no_std]

/// Per-device egress configuration, keyed by the managed interface's ifindex.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EgressSettings {
    /// Interface index of the external interface to redirect to
    pub external_ifindex: u32,
    /// Label stamped into outgoing packets
    pub label: u32,
}

/// Highest label the control plane will register.
pub const MAX_LABEL: u32 = 16;

/// Capacity of both routing maps (labels 0..=16).
pub const LABEL_CAPACITY: u32 = MAX_LABEL + 1;

/// Offset of the byte carrying the label tag in its upper nibble.
pub const TAG_OFFSET: usize = 1;

/// Bits of the tag byte that belong to the original packet.
pub const TAG_PAYLOAD_MASK: u8 = 0x0F;

/// Shift of the label inside the tag byte.
pub const TAG_SHIFT: u8 = 4;

// bpf_redirect flags
pub const BPF_F_INGRESS: u64 = 1;

/// Stamp `label` into the upper nibble of `byte`, keeping the lower nibble.
///
/// Only four bits are available on the wire, so label 16 is written as 0.
#[inline(always)]
pub fn tag(byte: u8, label: u32) -> u8 {
    (((label as u8) & TAG_PAYLOAD_MASK) << TAG_SHIFT) | (byte & TAG_PAYLOAD_MASK)
}

/// Split a tag byte into (label, restored original byte).
#[inline(always)]
pub fn untag(byte: u8) -> (u32, u8) {
    ((byte >> TAG_SHIFT) as u32, byte & TAG_PAYLOAD_MASK)
}
