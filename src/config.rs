use crate::types::{AttachPolicy, Slot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon configuration. Every section is optional; an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub frontend: FrontendConfig,
    pub kodi: KodiConfig,
    pub xineliboutput: XineliboutputConfig,
    pub xine: XineConfig,
    pub external: ExternalConfig,
    pub host: HostConfig,
    pub veto: VetoConfig,
    pub control: ControlConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Slot selected at startup
    pub frontend: Slot,
    pub attach: AttachPolicy,
    pub bg_attached: Option<PathBuf>,
    pub bg_detached: Option<PathBuf>,
    /// X display handed to spawned frontends
    pub display: String,
    /// Command printing a screen suffix appended to the display
    /// Example: ["dbget", "vdr.tempdisplay"]
    pub get_tempdisplay: Option<Vec<String>>,
    /// Delay between a soft detach and the shutdown request it arms
    pub shutdown_delay_ms: u64,
    /// How long a switch waits for the outgoing child to exit
    pub release_timeout_ms: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            frontend: Slot::Vdr,
            attach: AttachPolicy::Always,
            bg_attached: None,
            bg_detached: None,
            display: ":0".to_string(),
            get_tempdisplay: None,
            shutdown_delay_ms: 300_000,
            release_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KodiConfig {
    pub enabled: bool,
    pub command: Vec<String>,
}

impl Default for KodiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: vec![
                "/usr/lib/kodi/kodi.bin".to_string(),
                "--standalone".to_string(),
                "--lircdev".to_string(),
                "/var/run/lirc/lircd".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SxfeMode {
    /// The host's own output plugin renders locally
    Local,
    /// A local client connects to the plugin's stream server
    Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XineliboutputConfig {
    pub mode: SxfeMode,
    pub origin: String,
    pub port: u16,
    /// Client argv; the stream URL is appended
    pub command: Vec<String>,
    pub probe_interval_ms: u64,
    pub probe_attempts: u32,
}

impl Default for XineliboutputConfig {
    fn default() -> Self {
        Self {
            mode: SxfeMode::Remote,
            origin: "127.0.0.1".to_string(),
            port: 37890,
            command: vec![
                "/usr/bin/vdr-sxfe".to_string(),
                "--post".to_string(),
                "tvtime:method=use_vo_driver".to_string(),
                "--reconnect".to_string(),
                "--audio=alsa".to_string(),
                "--syslog".to_string(),
            ],
            probe_interval_ms: 1000,
            probe_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XineConfig {
    pub autocrop: bool,
    pub anamorphic: bool,
    pub aspect_ratio: String,
    pub command: Vec<String>,
    pub mrl: String,
}

impl Default for XineConfig {
    fn default() -> Self {
        let command = [
            "/usr/bin/xine",
            "--post",
            "tvtime:method=use_vo_driver",
            "--config",
            "/etc/xine/config",
            "--keymap=file:/etc/xine/keymap",
            "--post",
            "vdr",
            "--post",
            "vdr_video",
            "--post",
            "vdr_audio",
            "--verbose=2",
            "--no-gui",
            "--no-logo",
            "--no-splash",
            "--deinterlace",
            "-pq",
            "-A",
            "pulseaudio",
        ];
        Self {
            autocrop: false,
            anamorphic: false,
            aspect_ratio: "16:9".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            mrl: "vdr:/tmp/vdr-xine/stream#demux:mpeg_pes".to_string(),
        }
    }
}

/// Polling of the shared audio device while an external consumer takes over
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub device_glob: String,
    /// Process names that count as managed frontends holding the device
    pub processes: Vec<String>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            poll_timeout_ms: 10_000,
            device_glob: "/dev/snd/*p".to_string(),
            processes: vec!["kodi".to_string(), "vdr".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bus name of the host
    pub destination: String,
    /// "system" or "session"
    pub bus: String,
    pub rpc_timeout_ms: u64,
    /// Delay before restarting a dead signal monitor
    pub monitor_restart_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            destination: "de.tvdr.vdr".to_string(),
            bus: "system".to_string(),
            rpc_timeout_ms: 5000,
            monitor_restart_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VetoConfig {
    pub enabled: bool,
    pub destination: String,
    pub path: String,
}

impl Default for VetoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: "org.yavdr.lifeguard".to_string(),
            path: "/Lifeguard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/vdr-frontend/control.sock"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub use_file: bool,
    pub logfile: PathBuf,
    /// trace, debug, info, warn or error
    pub loglevel: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            use_file: false,
            logfile: PathBuf::from("/tmp/frontend.log"),
            loglevel: "debug".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}
