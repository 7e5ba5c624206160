//! Child process supervision
//!
//! Frontend processes are spawned with display overrides, and a watcher task
//! reports the raw wait status back to the controller exactly once.

use crate::error::{ArbiterError, Result};
use crate::event::{Event, Scheduler};
use crate::types::Slot;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Raw status a child uses to ask for a system shutdown (exit code 64)
pub const SHUTDOWN_STATUS: i32 = 16384;
/// Raw status a child uses to ask for a reboot (exit code 66)
pub const REBOOT_STATUS: i32 = 16896;

/// How a supervised child ended, derived from its packed wait status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCondition {
    Normal,
    /// Crash, signal, or any status without a defined meaning
    Abnormal(i32),
    ShutdownRequested,
    RebootRequested,
}

impl ExitCondition {
    pub fn classify(raw_status: i32) -> Self {
        match raw_status {
            0 => ExitCondition::Normal,
            SHUTDOWN_STATUS => ExitCondition::ShutdownRequested,
            REBOOT_STATUS => ExitCondition::RebootRequested,
            other => ExitCondition::Abnormal(other),
        }
    }
}

/// Environment overrides selecting the target display
pub fn display_env(display: &str) -> Vec<(String, String)> {
    vec![
        ("DISPLAY".to_string(), display.to_string()),
        ("__GL_SYNC_TO_VBLANK".to_string(), "1".to_string()),
        ("__GL_SYNC_DISPLAY_DEVICE".to_string(), display.to_string()),
    ]
}

/// Spawn `argv` and report its exit as `Event::ChildExited` for `slot`
///
/// Returns the child's PID.
pub fn spawn_supervised(
    argv: &[String],
    env: &[(String, String)],
    slot: Slot,
    scheduler: &Scheduler,
) -> Result<u32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ArbiterError::InvalidRequest(format!("empty command for {}", slot)))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.stdin(Stdio::null());

    let mut child = cmd.spawn().map_err(|source| ArbiterError::Spawn {
        program: program.clone(),
        source,
    })?;

    let pid = child
        .id()
        .ok_or_else(|| ArbiterError::Supervision(format!("{} exited before it was watched", program)))?;

    info!("Started {} (pid {}) for {}", program, pid, slot);

    let scheduler = scheduler.clone();
    let program = program.clone();
    tokio::spawn(async move {
        let raw_status = match child.wait().await {
            Ok(status) => status.into_raw(),
            Err(e) => {
                error!("Failed to wait for {} (pid {}): {}", program, pid, e);
                -1
            }
        };
        debug!("{} (pid {}) exited with status {}", program, pid, raw_status);
        if !scheduler.post(Event::ChildExited {
            slot,
            pid,
            raw_status,
        }) {
            debug!("Controller gone, dropping exit of pid {}", pid);
        }
    });

    Ok(pid)
}

/// Ask a child to terminate gracefully
///
/// Returns false if the process was already gone.
pub fn terminate(pid: u32) -> Result<bool> {
    send_signal(pid, Signal::SIGTERM)
}

/// Kill a child outright
pub fn kill(pid: u32) -> Result<bool> {
    send_signal(pid, Signal::SIGKILL)
}

fn send_signal(pid: u32, sig: Signal) -> Result<bool> {
    let raw = i32::try_from(pid)
        .map_err(|_| ArbiterError::Supervision(format!("pid {} out of range", pid)))?;
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => {
            debug!("Sent {} to pid {}", sig, pid);
            Ok(true)
        }
        Err(Errno::ESRCH) => {
            warn!("pid {} already terminated", pid);
            Ok(false)
        }
        Err(e) => Err(ArbiterError::Supervision(format!(
            "could not send {} to pid {}: {}",
            sig, pid, e
        ))),
    }
}
