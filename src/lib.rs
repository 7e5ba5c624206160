// Library interface for integration tests

pub mod config;
pub mod control;
pub mod controller;
pub mod desktop;
pub mod error;
pub mod event;
pub mod gvariant;
pub mod host;
pub mod host_watcher;
pub mod inhibitor;
pub mod shutdown;
pub mod supervisor;
pub mod types;

// Frontend implementations
pub mod drivers;
