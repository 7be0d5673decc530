//! Test utilities for l3mp.
//!
//! In-memory stand-ins for the kernel datapath and for netlink, so the
//! loader and multiplexer can be exercised without CAP_NET_ADMIN.

pub mod datapath;
pub mod links;

pub use datapath::{FakeDatapath, FakeKernel, Root};
pub use links::{FakeLinks, FakeLinkState};

use crate::config::{Config, ManagedSpec};
use crate::device::Interface;
use crate::label::Label;

/// Default MTU of the fake external interface
pub const EXTERNAL_MTU: u32 = 1500;

/// Build an interface value without touching the kernel
pub fn test_interface(name: &str, index: u32) -> Interface {
    Interface {
        name: name.to_string(),
        index,
        mtu: EXTERNAL_MTU,
    }
}

/// Build a validated config from `name@label` pairs
pub fn test_config(external: &str, pairs: &[(&str, i64)]) -> Config {
    let managed = pairs
        .iter()
        .map(|(name, label)| ManagedSpec {
            name: name.to_string(),
            label: Label::new(*label).expect("test label out of range"),
        })
        .collect();
    Config::new(external, managed).expect("invalid test config")
}
