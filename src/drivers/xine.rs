//! Standalone xine player reading the host's stream fifo

use super::{ChildExit, DriverContext, FrontendDriver};
use crate::config::XineConfig;
use crate::error::Result;
use crate::supervisor::{self, ExitCondition};
use crate::types::{AttachState, DriverKind};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

const AUTOCROP: &str = "autocrop:enable_autodetect=1,enable_subs_detect=1,soft_start=1,stabilize=1";

/// Full player argv for the given settings
pub fn xine_command(config: &XineConfig) -> Vec<String> {
    let mut argv = config.command.clone();
    if config.autocrop {
        argv.push("--post".to_string());
        argv.push(AUTOCROP.to_string());
    }
    if config.anamorphic {
        argv.push(format!("--aspect-ratio={}", config.aspect_ratio));
    }
    argv.push(config.mrl.clone());
    argv
}

pub struct XineDriver {
    ctx: DriverContext,
    command: Vec<String>,
    child: Option<u32>,
    terminating: HashSet<u32>,
}

impl XineDriver {
    pub fn new(ctx: DriverContext, config: &XineConfig) -> Self {
        let command = xine_command(config);
        debug!("{}", command.join(" "));
        Self {
            ctx,
            command,
            child: None,
            terminating: HashSet::new(),
        }
    }
}

#[async_trait]
impl FrontendDriver for XineDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Xine
    }

    async fn attach(&mut self, _options: Option<&str>) -> Result<bool> {
        if self.child.is_some() {
            return Ok(true);
        }
        debug!("starting xine");
        let env = supervisor::display_env(&self.ctx.display.get());
        let pid = supervisor::spawn_supervised(&self.command, &env, self.ctx.slot, &self.ctx.scheduler)?;
        self.child = Some(pid);
        debug!("started xine");
        Ok(true)
    }

    async fn detach(&mut self) -> Result<bool> {
        debug!("stopping xine");
        match self.child.take() {
            Some(pid) => {
                if let Err(e) = supervisor::terminate(pid) {
                    self.child = Some(pid);
                    return Err(e);
                }
                self.terminating.insert(pid);
            }
            None => info!("xine already terminated"),
        }
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        self.attach(None).await
    }

    async fn status(&mut self) -> AttachState {
        if self.child.is_some() {
            AttachState::Attached
        } else {
            AttachState::Detached
        }
    }

    fn on_exit(&mut self, pid: u32, condition: ExitCondition) -> ChildExit {
        if self.terminating.remove(&pid) {
            ChildExit::Released
        } else if self.child == Some(pid) {
            self.child = None;
            ChildExit::Exited(condition)
        } else {
            ChildExit::Stale
        }
    }

    fn pending_release(&self) -> bool {
        !self.terminating.is_empty()
    }
}
