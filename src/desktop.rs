//! Desktop collaborators: display selection, wallpaper, and audio device ownership

use crate::config::ExternalConfig;
use crate::error::{ArbiterError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use tokio::process::Command;
use tracing::{debug, warn};

/// The X display spawned frontends are pointed at
///
/// Shared between the controller and the drivers it builds.
#[derive(Debug, Clone)]
pub struct DisplayHandle(Arc<RwLock<String>>);

impl DisplayHandle {
    pub fn new(display: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(display.into())))
    }

    pub fn get(&self) -> String {
        match self.0.read() {
            Ok(display) => display.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, display: impl Into<String>) {
        let display = display.into();
        match self.0.write() {
            Ok(mut current) => *current = display,
            Err(poisoned) => *poisoned.into_inner() = display,
        }
    }
}

/// Combine the configured display with an optional screen suffix
///
/// `:0.1` with suffix `.2` becomes `:0.2`; without a suffix the screen part is dropped.
pub fn compose_display(configured: &str, suffix: &str) -> String {
    let base = configured.split('.').next().unwrap_or(configured);
    format!("{}{}", base, suffix.trim())
}

/// Resolve the display, asking `get_tempdisplay` for a screen suffix if configured
pub async fn resolve_display(configured: &str, get_tempdisplay: Option<&[String]>) -> String {
    let suffix = match get_tempdisplay.and_then(|argv| argv.split_first()) {
        Some((program, args)) => match Command::new(program).args(args).output().await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(output) => {
                debug!("{} exited with {}", program, output.status);
                String::new()
            }
            Err(e) => {
                debug!("Could not run {}: {}", program, e);
                String::new()
            }
        },
        None => String::new(),
    };
    let screen = compose_display(configured, &suffix);
    debug!("DISPLAY: {}", screen);
    screen
}

#[async_trait]
pub trait Wallpaper: Send + Sync {
    async fn set(&self, path: &Path, screen: &str) -> Result<()>;
}

/// Sets the root window background with feh
pub struct FehWallpaper;

#[async_trait]
impl Wallpaper for FehWallpaper {
    async fn set(&self, path: &Path, screen: &str) -> Result<()> {
        debug!("Setting background {:?} on {}", path, screen);
        let status = Command::new("/usr/bin/feh")
            .arg("--bg-fill")
            .arg(path)
            .env("DISPLAY", screen)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| ArbiterError::Spawn {
                program: "feh".to_string(),
                source,
            })?;
        if !status.success() {
            return Err(ArbiterError::rpc("feh --bg-fill", status));
        }
        Ok(())
    }
}

/// Reports whether a managed frontend still holds the shared audio device
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn busy(&self) -> Result<bool>;
}

/// Inspects the device's users with `fuser -v`
pub struct FuserProbe {
    config: ExternalConfig,
}

impl FuserProbe {
    pub fn new(config: ExternalConfig) -> Self {
        Self { config }
    }
}

/// Command names listed in `fuser -v` output
///
/// ```text
///                      USER        PID ACCESS COMMAND
/// /dev/snd/pcmC0D3p:   vdr        1234 F...m vdr
///                      kodi       2345 F...m kodi.bin
/// ```
pub fn fuser_commands(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.contains("COMMAND"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // user, pid, access, command (optionally preceded by the device path)
            if fields.len() >= 4 {
                fields.last().map(|s| s.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Whether any holder matches one of the managed process names
pub fn held_by_managed(commands: &[String], managed: &[String]) -> bool {
    commands
        .iter()
        .any(|command| managed.iter().any(|name| command.starts_with(name.as_str())))
}

#[async_trait]
impl DeviceProbe for FuserProbe {
    async fn busy(&self) -> Result<bool> {
        // The glob needs a shell; fuser reports on stderr and exits 1 when nothing matches
        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("fuser -v {}", self.config.device_glob))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ArbiterError::Spawn {
                program: "fuser".to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("fuser output: {}", stderr.trim());
        if stderr.contains("not found") {
            warn!("fuser is not available");
            return Err(ArbiterError::rpc("fuser", stderr.trim()));
        }
        let commands = fuser_commands(&stderr);
        Ok(held_by_managed(&commands, &self.config.processes))
    }
}
