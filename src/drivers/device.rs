//! Host output plugins that render through the host's primary device
//!
//! Attaching asks the host to make the plugin's device primary, detaching
//! hands the primary role to the null device. No process is owned.

use super::{DriverContext, FrontendDriver};
use crate::error::Result;
use crate::types::{AttachState, DriverKind};
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub struct DeviceDriver {
    kind: DriverKind,
    ctx: DriverContext,
}

impl DeviceDriver {
    pub fn new(kind: DriverKind, ctx: DriverContext) -> Self {
        Self { kind, ctx }
    }

    fn device(&self) -> &'static str {
        self.kind.name()
    }
}

#[async_trait]
impl FrontendDriver for DeviceDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn attach(&mut self, options: Option<&str>) -> Result<bool> {
        if let Some(options) = options {
            debug!("{}: ignoring attach options {:?}", self.device(), options);
        }
        info!("{}: requesting primary device", self.device());
        self.ctx.host.request_primary_by_name(self.device()).await?;
        Ok(true)
    }

    async fn detach(&mut self) -> Result<bool> {
        let null = self.ctx.host.null_device().await?;
        info!("{}: handing primary device to null device {}", self.device(), null);
        self.ctx.host.request_primary(null).await?;
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        self.attach(None).await
    }

    async fn status(&mut self) -> AttachState {
        let state = match self.ctx.host.primary_device().await {
            Ok(name) if name == self.device() => AttachState::Attached,
            Ok(_) => AttachState::Detached,
            Err(e) => {
                warn!("{}: could not query primary device: {}", self.device(), e);
                AttachState::Detached
            }
        };
        debug!("{}: got status: {}", self.device(), state.code());
        state
    }
}
