//! Host lifecycle watcher
//!
//! Follows `gdbus monitor` output for the host's bus name and turns its
//! signals and name-ownership changes into `HostReady`/`HostStopped`.

use crate::config::HostConfig;
use crate::event::{Event, Scheduler};
use crate::types::HostSignal;
use lazy_static::lazy_static;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// A line of monitor output that matters to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHostEvent {
    Ready,
    Stop,
    Start,
    NameOwned(String),
    NameLost,
}

lazy_static! {
    // /vdr: de.tvdr.vdr.vdr.Ready ()
    static ref SIGNAL_RE: Regex =
        Regex::new(r"^\S+: (?P<iface>[\w.]+)\.(?P<member>\w+) \(").unwrap();
    // The name de.tvdr.vdr is owned by :1.42
    static ref OWNED_RE: Regex =
        Regex::new(r"^The name (?P<name>\S+) is owned by (?P<owner>\S+)").unwrap();
    // The name de.tvdr.vdr does not have an owner
    static ref LOST_RE: Regex =
        Regex::new(r"^The name (?P<name>\S+) does not have an owner").unwrap();
}

pub fn parse_monitor_line(line: &str, destination: &str) -> Option<RawHostEvent> {
    let line = line.trim();

    if let Some(caps) = OWNED_RE.captures(line) {
        return (&caps["name"] == destination)
            .then(|| RawHostEvent::NameOwned(caps["owner"].to_string()));
    }
    if let Some(caps) = LOST_RE.captures(line) {
        return (&caps["name"] == destination).then_some(RawHostEvent::NameLost);
    }

    let caps = SIGNAL_RE.captures(line)?;
    if !caps["iface"].starts_with(destination) {
        return None;
    }
    match &caps["member"] {
        "Ready" => Some(RawHostEvent::Ready),
        "Stop" => Some(RawHostEvent::Stop),
        "Start" => Some(RawHostEvent::Start),
        _ => None,
    }
}

/// De-duplicates raw host events into lifecycle signals
///
/// A stop (explicit or through lost name ownership) is only reported on the
/// transition from ready to not ready.
#[derive(Debug)]
pub struct HostStatusWatcher {
    ready: bool,
}

impl HostStatusWatcher {
    pub fn new(initially_ready: bool) -> Self {
        Self {
            ready: initially_ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn observe(&mut self, event: RawHostEvent) -> Option<HostSignal> {
        match event {
            RawHostEvent::Ready => {
                info!("Host ready");
                self.ready = true;
                Some(HostSignal::HostReady)
            }
            RawHostEvent::Stop | RawHostEvent::NameLost => {
                if self.ready {
                    info!("Host stopped ({:?})", event);
                    self.ready = false;
                    Some(HostSignal::HostStopped)
                } else {
                    debug!("Ignoring {:?}, host already not ready", event);
                    None
                }
            }
            RawHostEvent::Start => {
                debug!("Host starting");
                None
            }
            RawHostEvent::NameOwned(owner) => {
                debug!("Host owns its bus name as {}", owner);
                None
            }
        }
    }
}

/// Follow the host's signals until the controller goes away
///
/// A dead monitor process is restarted after `monitor_restart_ms`.
pub async fn run(config: HostConfig, scheduler: Scheduler, initially_ready: bool) {
    let mut watcher = HostStatusWatcher::new(initially_ready);
    let restart_delay = Duration::from_millis(config.monitor_restart_ms);

    loop {
        let mut child = match Command::new("gdbus")
            .arg("monitor")
            .arg(format!("--{}", config.bus))
            .arg("--dest")
            .arg(&config.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start host monitor: {}", e);
                tokio::time::sleep(restart_delay).await;
                continue;
            }
        };

        if let Some(stdout) = child.stdout.take() {
            info!("Watching host signals on {}", config.destination);
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(raw) = parse_monitor_line(&line, &config.destination) else {
                            continue;
                        };
                        if let Some(signal) = watcher.observe(raw) {
                            if !scheduler.post(Event::Host(signal)) {
                                debug!("Controller gone, host watcher exiting");
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading host monitor output: {}", e);
                        break;
                    }
                }
            }
        }

        let _ = child.kill().await;
        warn!(
            "Host monitor ended, restarting in {}ms",
            restart_delay.as_millis()
        );
        tokio::time::sleep(restart_delay).await;
    }
}
