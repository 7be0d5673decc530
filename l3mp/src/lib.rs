//! l3mp: label-based multiplexing of point-to-point interfaces.
//!
//! Several TUN devices ("managed interfaces") share one external interface.
//! Each managed interface owns a label in `0..=16`; TC classifiers tag and
//! redirect packets between them based on that label.
//!
//! # Architecture
//!
//! ```text
//!            egress: stamp label, redirect
//!   mp1 (TUN) ---------------------------+
//!   mp2 (TUN) ---------------------------+--> external (eth0)
//!        ^                                          |
//!        |    ingress: read label, look up          |
//!        +------- INGRESS_DESTINATIONS <------------+
//! ```
//!
//! The [`Loader`] attaches the classifiers and keeps the label routing table
//! in the kernel consistent; the [`Multiplexer`] drives it from a [`Config`]
//! and owns the managed devices.

pub mod attach;
pub mod config;
pub mod datapath;
pub mod device;
pub mod ebpf_loader;
pub mod error;
pub mod label;
pub mod loader;
pub mod multiplexer;
pub mod rlimit;
pub mod routing;
pub mod tun;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

// Re-export commonly used types
pub use attach::{AttachmentHandle, Direction};
pub use config::{Config, ConfigError, ManagedSpec};
pub use datapath::Datapath;
pub use device::{Interface, LinkManager, ManagedInterface, NetlinkLinks};
pub use ebpf_loader::EbpfDatapath;
pub use error::{Error, Result};
pub use label::{LABEL_CAPACITY, Label, MAX_LABEL};
pub use loader::Loader;
pub use multiplexer::Multiplexer;
pub use routing::EgressSettings;
