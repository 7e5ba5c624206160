//! Shutdown negotiation
//!
//! A shutdown goes ahead only when the host confirms it and the optional veto
//! service raises no objection. Host confirmation is fail-closed; the veto
//! service is fail-open.

use crate::host::{HostBus, VetoService};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ShutdownNegotiator {
    host: Arc<dyn HostBus>,
    veto: Option<Arc<dyn VetoService>>,
}

impl ShutdownNegotiator {
    pub fn new(host: Arc<dyn HostBus>, veto: Option<Arc<dyn VetoService>>) -> Self {
        Self { host, veto }
    }

    /// Returns true if the shutdown may proceed
    pub async fn request(&self, user: bool) -> bool {
        match self.host.confirm_shutdown(user).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Host is not ready to shut down");
                return false;
            }
            Err(e) => {
                warn!("Could not confirm shutdown with host, deferring: {}", e);
                return false;
            }
        }

        self.veto_allows().await
    }

    async fn veto_allows(&self) -> bool {
        let Some(veto) = &self.veto else {
            return true;
        };
        match veto.check().await {
            Ok((true, _)) => true,
            Ok((false, reason)) => {
                info!("Shutdown vetoed: {}", reason);
                false
            }
            Err(e) => {
                warn!("Veto service unreachable, proceeding with shutdown: {}", e);
                true
            }
        }
    }
}
