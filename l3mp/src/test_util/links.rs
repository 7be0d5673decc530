//! In-memory [`LinkManager`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::{Interface, LinkManager};
use crate::error::{Error, Result};
use crate::tun;

#[derive(Debug)]
pub struct FakeLinkState {
    /// Existing links by name
    pub links: BTreeMap<String, Interface>,
    pub next_index: u32,
    pub created: Vec<String>,
    pub destroyed: Vec<String>,
    /// Creating this name fails
    pub fail_create: Option<String>,
}

impl Default for FakeLinkState {
    fn default() -> Self {
        Self {
            links: BTreeMap::new(),
            // 1 is lo
            next_index: 2,
            created: Vec::new(),
            destroyed: Vec::new(),
            fail_create: None,
        }
    }
}

/// [`LinkManager`] that keeps its links in a map.
#[derive(Clone, Default)]
pub struct FakeLinks {
    state: Arc<Mutex<FakeLinkState>>,
}

impl FakeLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-existing interface (the external one) and return it.
    pub fn add_existing(&self, name: &str, mtu: u32) -> Interface {
        let mut s = self.lock();
        let iface = Interface {
            name: name.to_string(),
            index: s.next_index,
            mtu,
        };
        s.next_index += 1;
        s.links.insert(name.to_string(), iface.clone());
        iface
    }

    pub fn get(&self, name: &str) -> Option<Interface> {
        self.lock().links.get(name).cloned()
    }

    pub fn state(&self) -> Arc<Mutex<FakeLinkState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, FakeLinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LinkManager for FakeLinks {
    async fn resolve_external(&self, name: &str) -> Result<Interface> {
        self.get(name).ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn create_managed(&self, name: &str, mtu: u32) -> Result<Interface> {
        let creation_failed = |source| Error::CreationFailed {
            name: name.to_string(),
            source,
        };

        tun::validate_name(name).map_err(creation_failed)?;

        let mut s = self.lock();
        if s.fail_create.as_deref() == Some(name) {
            return Err(creation_failed(io::Error::other("injected failure")));
        }
        if s.links.contains_key(name) {
            return Err(creation_failed(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "interface already exists",
            )));
        }

        let iface = Interface {
            name: name.to_string(),
            index: s.next_index,
            mtu,
        };
        s.next_index += 1;
        s.links.insert(name.to_string(), iface.clone());
        s.created.push(name.to_string());
        Ok(iface)
    }

    async fn destroy(&self, device: &Interface) -> Result<()> {
        let mut s = self.lock();
        s.links.remove(&device.name);
        s.destroyed.push(device.name.clone());
        Ok(())
    }
}
