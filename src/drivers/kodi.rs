//! Standalone media center application
//!
//! Owns one child process at a time. Each attach takes an inhibitor lease that
//! lives until that child's exit has been observed.

use super::{ChildExit, DriverContext, FrontendDriver};
use crate::error::Result;
use crate::inhibitor::{Inhibitor, InhibitorLease};
use crate::supervisor::{self, ExitCondition};
use crate::types::{AttachState, DriverKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct KodiDriver {
    ctx: DriverContext,
    command: Vec<String>,
    inhibitor: Arc<dyn Inhibitor>,
    /// Live child
    child: Option<u32>,
    /// Children we asked to terminate whose exit is still outstanding
    terminating: HashSet<u32>,
    /// Lease per spawned child
    leases: HashMap<u32, InhibitorLease>,
}

impl KodiDriver {
    pub fn new(ctx: DriverContext, command: Vec<String>, inhibitor: Arc<dyn Inhibitor>) -> Self {
        debug!("kodi command: {}", command.join(" "));
        Self {
            ctx,
            command,
            inhibitor,
            child: None,
            terminating: HashSet::new(),
            leases: HashMap::new(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child
    }
}

#[async_trait]
impl FrontendDriver for KodiDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Kodi
    }

    async fn attach(&mut self, _options: Option<&str>) -> Result<bool> {
        if self.child.is_some() {
            debug!("kodi already running");
            return Ok(true);
        }
        info!("starting kodi");

        let lease = match self.inhibitor.acquire("frontend", "kodi running") {
            Ok(lease) => Some(lease),
            Err(e) => {
                warn!("could not set inhibitor lock: {}", e);
                None
            }
        };

        let env = supervisor::display_env(&self.ctx.display.get());
        // On spawn failure the lease is dropped here, which releases it
        let pid = supervisor::spawn_supervised(&self.command, &env, self.ctx.slot, &self.ctx.scheduler)?;

        if let Some(lease) = lease {
            self.leases.insert(pid, lease);
        }
        self.child = Some(pid);
        debug!("started kodi");
        Ok(true)
    }

    async fn detach(&mut self) -> Result<bool> {
        info!("stopping kodi");
        match self.child.take() {
            Some(pid) => match supervisor::terminate(pid) {
                Ok(sent) => {
                    if !sent {
                        info!("kodi already terminated");
                    }
                    // The exit event is still on its way in both cases
                    self.terminating.insert(pid);
                }
                Err(e) => {
                    self.child = Some(pid);
                    return Err(e);
                }
            },
            None => info!("kodi already terminated"),
        }
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        if self.child.is_some() {
            debug!("kodi already running");
            Ok(true)
        } else {
            self.attach(None).await
        }
    }

    async fn status(&mut self) -> AttachState {
        if self.child.is_some() {
            AttachState::Attached
        } else {
            AttachState::Detached
        }
    }

    fn on_exit(&mut self, pid: u32, condition: ExitCondition) -> ChildExit {
        if let Some(lease) = self.leases.remove(&pid) {
            lease.release();
        }

        if self.terminating.remove(&pid) {
            debug!("kodi (pid {}) stopped as requested", pid);
            ChildExit::Released
        } else if self.child == Some(pid) {
            self.child = None;
            ChildExit::Exited(condition)
        } else {
            debug!("ignoring exit of unknown pid {}", pid);
            ChildExit::Stale
        }
    }

    fn pending_release(&self) -> bool {
        !self.terminating.is_empty()
    }

    fn survives_power_key(&self) -> bool {
        false
    }
}
