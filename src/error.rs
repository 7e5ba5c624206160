//! Error taxonomy for the frontend arbiter
//!
//! Every failure is contained at the component boundary that produced it and
//! reported through logging. Only `InvalidRequest` ever reaches a control
//! caller as an error; everything else turns into a false/neutral reply.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbiterError {
    /// No driver could be built for a configured slot
    #[error("no driver available for {0}")]
    Resolution(String),

    /// An attach/detach/resume transition failed
    #[error("transition failed: {0}")]
    Transition(String),

    /// A supervised child could not be watched or signalled
    #[error("supervision failed: {0}")]
    Supervision(String),

    /// Shutdown could not be confirmed
    #[error("shutdown negotiation failed: {0}")]
    Negotiation(String),

    /// A host or auxiliary service call failed
    #[error("{method} failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    /// A caller argument was structurally invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A reply from an external tool could not be understood
    #[error("malformed reply: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArbiterError {
    pub fn rpc(method: impl Into<String>, reason: impl ToString) -> Self {
        ArbiterError::Rpc {
            method: method.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
