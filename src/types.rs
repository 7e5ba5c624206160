use serde::{Deserialize, Serialize};
use std::fmt;

/// A controller slot: the host-native rendering path or the media center application.
///
/// The switch order cycles over the instantiated slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Vdr,
    Kodi,
}

impl Slot {
    /// All slots in switch order
    pub const ALL: [Slot; 2] = [Slot::Vdr, Slot::Kodi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Vdr => "vdr",
            Slot::Kodi => "kodi",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete frontend behind a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Primary host output plugin
    Softhddevice,
    /// Headless hardware output plugin
    Rpihddevice,
    /// Network video client of the xineliboutput plugin
    Sxfe,
    /// Oldest legacy output, a xine process reading the host's stream
    Xine,
    /// Standalone media center application
    Kodi,
    Dummy,
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Softhddevice => "softhddevice",
            DriverKind::Rpihddevice => "rpihddevice",
            DriverKind::Sxfe => "vdr-sxfe",
            DriverKind::Xine => "xine",
            DriverKind::Kodi => "kodi",
            DriverKind::Dummy => "dummy",
        }
    }

    /// Whether the frontend is driven by a host output plugin
    pub fn is_host_native(&self) -> bool {
        !matches!(self, DriverKind::Kodi | DriverKind::Dummy)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally observable attach state, reported as an integer code on the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    Attached,
    Transitioning,
    /// A consumer outside the managed set holds the surface
    External,
}

impl AttachState {
    pub fn code(&self) -> i32 {
        match self {
            AttachState::Detached => 0,
            AttachState::Attached => 1,
            AttachState::Transitioning => 2,
            AttachState::External => 3,
        }
    }

    /// Attached or on its way there
    pub fn is_engaged(&self) -> bool {
        matches!(self, AttachState::Attached | AttachState::Transitioning)
    }
}

/// When to attach a frontend at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachPolicy {
    Never,
    /// Attach only if the host was started manually
    Auto,
    Always,
}

/// Normalized host lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    HostReady,
    HostStopped,
}
