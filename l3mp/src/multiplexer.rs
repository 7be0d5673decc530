//! Top-level orchestration: setup from a [`Config`], wait, reverse-order teardown.

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::datapath::Datapath;
use crate::device::{LinkManager, ManagedInterface};
use crate::error::{Error, Result};
use crate::loader::Loader;

/// Owns the loader and the managed devices it routes to.
pub struct Multiplexer<D: Datapath, L: LinkManager> {
    loader: Loader<D>,
    links: L,
    /// Devices we created, in creation order
    managed: Vec<ManagedInterface>,
}

impl<D: Datapath, L: LinkManager> Multiplexer<D, L> {
    pub fn new(datapath: D, links: L) -> Self {
        Self {
            loader: Loader::new(datapath),
            links,
            managed: Vec::new(),
        }
    }

    pub fn loader(&self) -> &Loader<D> {
        &self.loader
    }

    pub fn managed(&self) -> &[ManagedInterface] {
        &self.managed
    }

    /// Bind the external interface, then create and register every managed
    /// interface. Stops at the first failure; whatever was created so far
    /// stays tracked for [`Multiplexer::shutdown`].
    pub async fn setup(&mut self, config: &Config) -> Result<()> {
        self.loader.set_max_label(config.max_label);
        let external = self
            .links
            .resolve_external(&config.external_interface)
            .await?;
        self.loader.apply_external(&external)?;

        for spec in &config.managed {
            let link = self.links.create_managed(&spec.name, external.mtu).await?;
            self.managed.push(ManagedInterface {
                link: link.clone(),
                label: spec.label,
            });
            self.loader.apply_to_managed(&link, spec.label.get() as i64)?;
        }

        info!(
            external = %external.name,
            managed = self.managed.len(),
            "Multiplexer ready"
        );
        Ok(())
    }

    /// Release routing state and delete managed devices (newest first), then
    /// close the loader. Keeps going past failures and returns them.
    pub async fn shutdown(self) -> Vec<Error> {
        let Self {
            mut loader,
            links,
            managed,
        } = self;
        let mut errors = Vec::new();

        for device in managed.iter().rev() {
            if let Err(e) = loader.release_managed(&device.link) {
                errors.push(e);
            }
            if let Err(e) = links.destroy(&device.link).await {
                warn!(if_name = %device.link.name, error = %e, "Error removing managed interface");
                errors.push(e);
            }
        }

        errors.extend(loader.close());
        errors
    }

    /// Set up, block until `shutdown` turns true, then tear down.
    ///
    /// A dropped sender counts as shutdown. A setup failure rolls back
    /// everything created so far before the error is returned.
    pub async fn run(mut self, config: &Config, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Err(e) = self.setup(config).await {
            error!(error = %e, "Setup failed, rolling back");
            self.shutdown().await;
            return Err(e);
        }

        let _ = shutdown.wait_for(|stop| *stop).await;
        info!("Shutting down...");

        let errors = self.shutdown().await;
        if !errors.is_empty() {
            warn!(failures = errors.len(), "Teardown finished with errors");
        }
        Ok(())
    }
}
