//! xineliboutput frontend
//!
//! In `local` mode the host's plugin renders itself and is switched with a
//! remote-console command. In `remote` mode a local vdr-sxfe client connects
//! to the plugin's stream server, which only comes up some time after the
//! host, so attaching probes the endpoint on a timer until it accepts.

use super::{ChildExit, DriverContext, FrontendDriver};
use crate::config::{SxfeMode, XineliboutputConfig};
use crate::error::{ArbiterError, Result};
use crate::event::{Timer, TimerKind};
use crate::supervisor::{self, ExitCondition};
use crate::types::{AttachState, DriverKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const PLUGIN: &str = "xineliboutput";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Whether a TCP connection to the endpoint can be established
pub async fn endpoint_reachable(origin: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((origin, port))).await,
        Ok(Ok(_))
    )
}

struct Probe {
    timer: Timer,
    attempts_left: u32,
}

pub struct SxfeDriver {
    ctx: DriverContext,
    config: XineliboutputConfig,
    child: Option<u32>,
    terminating: HashSet<u32>,
    probe: Option<Probe>,
    /// Attach state in local mode
    local_attached: bool,
}

impl SxfeDriver {
    pub fn new(ctx: DriverContext, config: XineliboutputConfig) -> Self {
        debug!("vdr-sxfe command: {}", Self::client_command(&config).join(" "));
        Self {
            ctx,
            config,
            child: None,
            terminating: HashSet::new(),
            probe: None,
            local_attached: false,
        }
    }

    pub fn client_command(config: &XineliboutputConfig) -> Vec<String> {
        let mut argv = config.command.clone();
        argv.push(format!("xvdr+tcp://{}:{}", config.origin, config.port));
        argv
    }

    fn spawn_client(&mut self) -> Result<()> {
        info!("starting vdr-sxfe");
        let env = supervisor::display_env(&self.ctx.display.get());
        let pid = supervisor::spawn_supervised(
            &Self::client_command(&self.config),
            &env,
            self.ctx.slot,
            &self.ctx.scheduler,
        )?;
        self.child = Some(pid);
        debug!("started vdr-sxfe");
        Ok(())
    }

    fn arm_probe(&mut self, attempts_left: u32) {
        let timer = self.ctx.scheduler.after(
            Duration::from_millis(self.config.probe_interval_ms),
            TimerKind::DriverRetry(self.ctx.slot),
        );
        self.probe = Some(Probe {
            timer,
            attempts_left,
        });
    }
}

#[async_trait]
impl FrontendDriver for SxfeDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sxfe
    }

    async fn attach(&mut self, _options: Option<&str>) -> Result<bool> {
        match self.config.mode {
            SxfeMode::Local => {
                if !self.local_attached {
                    self.ctx.host.svdrp_command(PLUGIN, "LFRO", "sxfe").await?;
                    self.local_attached = true;
                }
                Ok(true)
            }
            SxfeMode::Remote => {
                if self.child.is_some() || self.probe.is_some() {
                    return Ok(true);
                }
                if endpoint_reachable(&self.config.origin, self.config.port).await {
                    self.spawn_client()?;
                } else {
                    info!(
                        "waiting for xineliboutput server on {}:{}",
                        self.config.origin, self.config.port
                    );
                    self.arm_probe(self.config.probe_attempts);
                }
                Ok(true)
            }
        }
    }

    async fn retry(&mut self, generation: u64) -> Result<bool> {
        let attempts_left = match &self.probe {
            Some(probe) if probe.timer.matches(generation) => probe.attempts_left,
            _ => return Ok(false),
        };
        self.probe = None;

        if endpoint_reachable(&self.config.origin, self.config.port).await {
            self.spawn_client()?;
            Ok(true)
        } else if attempts_left > 1 {
            debug!("xineliboutput server not reachable yet, {} attempts left", attempts_left - 1);
            self.arm_probe(attempts_left - 1);
            Ok(false)
        } else {
            Err(ArbiterError::Transition(format!(
                "xineliboutput server {}:{} never became reachable",
                self.config.origin, self.config.port
            )))
        }
    }

    async fn detach(&mut self) -> Result<bool> {
        match self.config.mode {
            SxfeMode::Local => {
                self.ctx.host.svdrp_command(PLUGIN, "LFRO", "none").await?;
                self.local_attached = false;
            }
            SxfeMode::Remote => {
                info!("stopping vdr-sxfe");
                if self.probe.take().is_some() {
                    debug!("cancelled pending server probe");
                }
                match self.child.take() {
                    Some(pid) => {
                        if let Err(e) = supervisor::kill(pid) {
                            self.child = Some(pid);
                            return Err(e);
                        }
                        self.terminating.insert(pid);
                    }
                    None => info!("vdr-sxfe already terminated"),
                }
            }
        }
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        match self.status().await {
            AttachState::Detached => self.attach(None).await,
            _ => Ok(true),
        }
    }

    async fn status(&mut self) -> AttachState {
        match self.config.mode {
            SxfeMode::Local if self.local_attached => AttachState::Attached,
            SxfeMode::Local => AttachState::Detached,
            SxfeMode::Remote if self.child.is_some() => AttachState::Attached,
            SxfeMode::Remote if self.probe.is_some() => AttachState::Transitioning,
            SxfeMode::Remote => AttachState::Detached,
        }
    }

    fn on_exit(&mut self, pid: u32, condition: ExitCondition) -> ChildExit {
        if self.terminating.remove(&pid) {
            ChildExit::Released
        } else if self.child == Some(pid) {
            self.child = None;
            warn!("vdr-sxfe exited: {:?}", condition);
            ChildExit::Exited(condition)
        } else {
            ChildExit::Stale
        }
    }

    fn pending_release(&self) -> bool {
        !self.terminating.is_empty()
    }

    fn survives_power_key(&self) -> bool {
        self.config.mode == SxfeMode::Local
    }
}
