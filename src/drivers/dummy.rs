use super::FrontendDriver;
use crate::error::Result;
use crate::types::{AttachState, DriverKind};
use async_trait::async_trait;

/// Stands in for a slot whose frontend is unavailable; every operation is a no-op
#[derive(Debug, Default)]
pub struct DummyDriver;

#[async_trait]
impl FrontendDriver for DummyDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Dummy
    }

    async fn attach(&mut self, _options: Option<&str>) -> Result<bool> {
        Ok(true)
    }

    async fn detach(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn status(&mut self) -> AttachState {
        AttachState::Detached
    }
}
