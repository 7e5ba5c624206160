//! Frontend drivers
//!
//! Each driver wraps one concrete frontend's attach/detach/resume/status
//! operations. The controller owns one driver per slot and only talks to
//! them through `FrontendDriver`.

pub mod device;
pub mod dummy;
pub mod kodi;
pub mod sxfe;
pub mod xine;

use crate::config::Config;
use crate::desktop::DisplayHandle;
use crate::error::Result;
use crate::event::Scheduler;
use crate::host::HostBus;
use crate::inhibitor::Inhibitor;
use crate::supervisor::ExitCondition;
use crate::types::{AttachState, DriverKind, Slot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use device::DeviceDriver;
pub use dummy::DummyDriver;
pub use kodi::KodiDriver;
pub use sxfe::SxfeDriver;
pub use xine::XineDriver;

/// What a driver makes of one of its children exiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Not a child this driver knows about
    Stale,
    /// A child this driver terminated itself
    Released,
    /// A live child ended on its own
    Exited(ExitCondition),
}

/// Everything a driver needs from its surroundings
#[derive(Clone)]
pub struct DriverContext {
    pub slot: Slot,
    pub host: Arc<dyn HostBus>,
    pub scheduler: Scheduler,
    pub display: DisplayHandle,
}

#[async_trait]
pub trait FrontendDriver: Send {
    fn kind(&self) -> DriverKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    async fn attach(&mut self, options: Option<&str>) -> Result<bool>;

    async fn detach(&mut self) -> Result<bool>;

    async fn resume(&mut self) -> Result<bool>;

    async fn status(&mut self) -> AttachState;

    /// Called once for every exit of a child spawned by this driver
    fn on_exit(&mut self, _pid: u32, _condition: ExitCondition) -> ChildExit {
        ChildExit::Stale
    }

    /// Called when a retry timer armed by this driver fires
    async fn retry(&mut self, _generation: u64) -> Result<bool> {
        Ok(false)
    }

    /// Whether a child this driver terminated has not exited yet
    fn pending_release(&self) -> bool {
        false
    }

    /// Whether the frontend copes with the host's power key while attached
    fn survives_power_key(&self) -> bool {
        true
    }
}

/// Builds the drivers for the controller's slots
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Driver for the host-native slot, if the host has an output plugin loaded
    async fn host_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>>;

    /// Driver for the application slot, if one is configured
    fn application_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>>;
}

/// Host output plugins in resolution priority order
pub const HOST_PLUGINS: [(&str, DriverKind); 4] = [
    ("softhddevice", DriverKind::Softhddevice),
    ("rpihddevice", DriverKind::Rpihddevice),
    ("xineliboutput", DriverKind::Sxfe),
    ("xine", DriverKind::Xine),
];

pub struct DefaultDriverFactory {
    config: Config,
    inhibitor: Arc<dyn Inhibitor>,
}

impl DefaultDriverFactory {
    pub fn new(config: Config, inhibitor: Arc<dyn Inhibitor>) -> Self {
        Self { config, inhibitor }
    }

    fn build(&self, kind: DriverKind, ctx: DriverContext) -> Box<dyn FrontendDriver> {
        match kind {
            DriverKind::Softhddevice | DriverKind::Rpihddevice => {
                Box::new(DeviceDriver::new(kind, ctx))
            }
            DriverKind::Sxfe => Box::new(SxfeDriver::new(ctx, self.config.xineliboutput.clone())),
            DriverKind::Xine => Box::new(XineDriver::new(ctx, &self.config.xine)),
            DriverKind::Kodi => Box::new(KodiDriver::new(
                ctx,
                self.config.kodi.command.clone(),
                self.inhibitor.clone(),
            )),
            DriverKind::Dummy => Box::new(DummyDriver),
        }
    }
}

#[async_trait]
impl DriverFactory for DefaultDriverFactory {
    async fn host_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>> {
        for (plugin, kind) in HOST_PLUGINS {
            match ctx.host.plugin_loaded(plugin).await {
                Ok(true) => {
                    info!("primary frontend is {}", kind);
                    return Some(self.build(kind, ctx));
                }
                Ok(false) => debug!("plugin {} not loaded", plugin),
                Err(e) => warn!("Could not query plugin {}: {}", plugin, e),
            }
        }
        warn!("no vdr frontend found");
        None
    }

    fn application_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>> {
        if self.config.kodi.enabled {
            Some(self.build(DriverKind::Kodi, ctx))
        } else {
            warn!("no KODI configuration found");
            None
        }
    }
}
