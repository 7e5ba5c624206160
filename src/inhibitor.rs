//! Sleep/shutdown inhibitor leases
//!
//! A lease blocks automatic sleep and shutdown while an external application
//! owns the surface. Releasing consumes the lease, and dropping an unreleased
//! lease releases it, so a lease can never leak or be released twice.

use crate::error::{ArbiterError, Result};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

type ReleaseFn = Box<dyn FnOnce() + Send>;

pub struct InhibitorLease {
    why: String,
    release: Option<ReleaseFn>,
}

impl InhibitorLease {
    /// Build a lease that runs `release` exactly once
    pub fn new(why: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            why: why.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn why(&self) -> &str {
        &self.why
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing inhibitor lease ({})", self.why);
            release();
        }
    }
}

impl Drop for InhibitorLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for InhibitorLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InhibitorLease")
            .field("why", &self.why)
            .field("held", &self.release.is_some())
            .finish()
    }
}

pub trait Inhibitor: Send + Sync {
    fn acquire(&self, who: &str, why: &str) -> Result<InhibitorLease>;
}

/// Holds a `systemd-inhibit` child for the lifetime of the lease
///
/// The child blocks on its stdin; releasing closes that pipe, so the lock is
/// also dropped if the daemon dies without releasing.
pub struct SystemdInhibitor {
    what: String,
}

impl SystemdInhibitor {
    pub fn new() -> Self {
        Self {
            what: "shutdown:sleep:idle".to_string(),
        }
    }
}

impl Default for SystemdInhibitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Inhibitor for SystemdInhibitor {
    fn acquire(&self, who: &str, why: &str) -> Result<InhibitorLease> {
        let mut child = Command::new("systemd-inhibit")
            .arg(format!("--what={}", self.what))
            .arg(format!("--who={}", who))
            .arg(format!("--why={}", why))
            .arg("--mode=block")
            .arg("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| ArbiterError::Spawn {
                program: "systemd-inhibit".to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ArbiterError::Supervision("systemd-inhibit has no stdin".to_string()))?;

        // Reap the helper whenever it exits
        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!("Failed to reap systemd-inhibit: {}", e);
            }
        });

        info!("Acquired inhibitor lock ({}) for {}", self.what, why);
        Ok(InhibitorLease::new(why, move || drop(stdin)))
    }
}
