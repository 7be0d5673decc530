//! Device binding: resolving the external interface and managing TUN devices.

use async_trait::async_trait;
use futures::TryStreamExt;
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::Handle;
use std::io;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::label::Label;
use crate::tun;

/// A network interface known to the kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub index: u32,
    pub mtu: u32,
}

/// A TUN device created by us and bound to a label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedInterface {
    pub link: Interface,
    pub label: Label,
}

/// Lookup, creation and deletion of network devices.
#[async_trait]
pub trait LinkManager: Send + Sync {
    /// Look up an existing interface by name.
    async fn resolve_external(&self, name: &str) -> Result<Interface>;

    /// Create a point-to-point device named `name` with the given MTU and bring it up.
    async fn create_managed(&self, name: &str, mtu: u32) -> Result<Interface>;

    /// Delete a device created by [`LinkManager::create_managed`].
    async fn destroy(&self, device: &Interface) -> Result<()>;
}

/// [`LinkManager`] backed by rtnetlink and the TUN driver.
pub struct NetlinkLinks {
    handle: Handle,
}

impl NetlinkLinks {
    /// Open a netlink connection. Must be called inside a tokio runtime.
    pub fn new() -> Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()
            .map_err(|e| Error::Netlink("rtnetlink".to_string(), e))?;
        tokio::spawn(connection);
        Ok(Self { handle })
    }

    async fn get_link(&self, name: &str) -> Result<Option<LinkMessage>> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();

        match links.try_next().await {
            Ok(link) => Ok(link),
            Err(rtnetlink::Error::NetlinkError(e)) if e.raw_code() == -libc::ENODEV => Ok(None),
            Err(e) => Err(Error::Netlink(name.to_string(), io::Error::other(e))),
        }
    }

    async fn delete_index(&self, name: &str, index: u32) -> Result<()> {
        self.handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| Error::Netlink(name.to_string(), io::Error::other(e)))
    }
}

fn link_mtu(link: &LinkMessage) -> Option<u32> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::Mtu(mtu) => Some(*mtu),
        _ => None,
    })
}

fn creation_failed(name: &str, source: io::Error) -> Error {
    Error::CreationFailed {
        name: name.to_string(),
        source,
    }
}

#[async_trait]
impl LinkManager for NetlinkLinks {
    async fn resolve_external(&self, name: &str) -> Result<Interface> {
        let link = self
            .get_link(name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let iface = Interface {
            name: name.to_string(),
            index: link.header.index,
            mtu: link_mtu(&link).unwrap_or(0),
        };
        info!(if_name = %iface.name, if_index = iface.index, mtu = iface.mtu, "External interface resolved");
        Ok(iface)
    }

    async fn create_managed(&self, name: &str, mtu: u32) -> Result<Interface> {
        tun::validate_name(name).map_err(|e| creation_failed(name, e))?;

        if self.get_link(name).await?.is_some() {
            return Err(creation_failed(
                name,
                io::Error::new(io::ErrorKind::AlreadyExists, "interface already exists"),
            ));
        }

        let index = tun::create_persistent_tun(name).map_err(|e| creation_failed(name, e))?;

        if let Err(e) = self
            .handle
            .link()
            .set(index)
            .mtu(mtu)
            .up()
            .execute()
            .await
        {
            if let Err(del) = self.delete_index(name, index).await {
                warn!(if_name = name, error = %del, "Failed to delete half-created device");
            }
            return Err(creation_failed(name, io::Error::other(e)));
        }

        info!(if_name = name, if_index = index, mtu, "Managed interface created");
        Ok(Interface {
            name: name.to_string(),
            index,
            mtu,
        })
    }

    async fn destroy(&self, device: &Interface) -> Result<()> {
        if self.get_link(&device.name).await?.is_none() {
            debug!(if_name = %device.name, "Interface already gone");
            return Ok(());
        }

        self.delete_index(&device.name, device.index)
            .await
            .map_err(|e| Error::Teardown(device.name.clone(), e.to_string()))?;

        info!(if_name = %device.name, if_index = device.index, "Managed interface deleted");
        Ok(())
    }
}
