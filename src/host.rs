//! Host RPC surface and the auxiliary shutdown veto service
//!
//! The production implementations shell out to `gdbus call` and parse the
//! textual reply. Everything above this module only sees the traits.

use crate::config::{HostConfig, VetoConfig};
use crate::error::{ArbiterError, Result};
use crate::gvariant::{self, Value};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Reply code of ConfirmShutdown meaning the host is ready to power off
pub const SHUTDOWN_CONFIRMED: i64 = 250;

#[async_trait]
pub trait HostBus: Send + Sync {
    /// Whether the host finished starting up
    async fn is_ready(&self) -> Result<bool>;

    /// Whether the host was started by the user rather than a timer or plugin
    async fn manual_start(&self) -> Result<bool>;

    /// Ask whether the host may shut down for a request of the given origin
    async fn confirm_shutdown(&self, user: bool) -> Result<bool>;

    async fn remote_enable(&self) -> Result<()>;
    async fn remote_disable(&self) -> Result<()>;
    async fn remote_enabled(&self) -> Result<bool>;
    async fn hit_key(&self, key: &str) -> Result<()>;

    async fn plugin_loaded(&self, name: &str) -> Result<bool>;

    /// Run a plugin's remote-console command
    async fn svdrp_command(&self, plugin: &str, command: &str, args: &str) -> Result<String>;

    /// Name of the current primary output device
    async fn primary_device(&self) -> Result<String>;
    async fn request_primary_by_name(&self, name: &str) -> Result<()>;
    async fn null_device(&self) -> Result<i64>;
    async fn request_primary(&self, index: i64) -> Result<()>;
}

#[async_trait]
pub trait VetoService: Send + Sync {
    /// Returns whether a shutdown is acceptable, plus a human-readable reason
    async fn check(&self) -> Result<(bool, String)>;
}

/// Invoke `gdbus call` and parse its reply tuple
async fn gdbus_call(
    bus: &str,
    destination: &str,
    object_path: &str,
    method: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Vec<Value>> {
    let mut cmd = Command::new("gdbus");
    cmd.arg("call")
        .arg(format!("--{}", bus))
        .arg("--dest")
        .arg(destination)
        .arg("--object-path")
        .arg(object_path)
        .arg("--method")
        .arg(method)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| ArbiterError::Spawn {
        program: "gdbus".to_string(),
        source,
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ArbiterError::Timeout(method.to_string(), timeout))??;

    if !output.status.success() {
        return Err(ArbiterError::rpc(
            method,
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("{} -> {}", method, stdout.trim());
    gvariant::parse_tuple(&stdout)
}

fn first<'a>(method: &str, values: &'a [Value]) -> Result<&'a Value> {
    values
        .first()
        .ok_or_else(|| ArbiterError::rpc(method, "empty reply"))
}

fn expect_bool(method: &str, values: &[Value]) -> Result<bool> {
    first(method, values)?
        .as_bool()
        .ok_or_else(|| ArbiterError::rpc(method, format!("expected boolean, got {:?}", values)))
}

fn expect_int(method: &str, values: &[Value]) -> Result<i64> {
    first(method, values)?
        .as_int()
        .ok_or_else(|| ArbiterError::rpc(method, format!("expected integer, got {:?}", values)))
}

/// Host reached through its bus interfaces
pub struct GdbusHost {
    config: HostConfig,
}

impl GdbusHost {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    async fn call(&self, path: &str, method: &str, args: &[String]) -> Result<Vec<Value>> {
        gdbus_call(
            &self.config.bus,
            &self.config.destination,
            path,
            method,
            args,
            Duration::from_millis(self.config.rpc_timeout_ms),
        )
        .await
    }
}

#[async_trait]
impl HostBus for GdbusHost {
    async fn is_ready(&self) -> Result<bool> {
        let method = "de.tvdr.vdr.vdr.Status";
        let reply = self.call("/vdr", method, &[]).await?;
        Ok(first(method, &reply)?.as_str() == Some("Ready"))
    }

    async fn manual_start(&self) -> Result<bool> {
        let method = "de.tvdr.vdr.shutdown.ManualStart";
        let reply = self.call("/Shutdown", method, &[]).await?;
        expect_bool(method, &reply)
    }

    async fn confirm_shutdown(&self, user: bool) -> Result<bool> {
        let method = "de.tvdr.vdr.shutdown.ConfirmShutdown";
        let reply = self.call("/Shutdown", method, &[user.to_string()]).await?;
        let code = expect_int(method, &reply)?;
        debug!("ConfirmShutdown({}) replied {}", user, code);
        Ok(code == SHUTDOWN_CONFIRMED)
    }

    async fn remote_enable(&self) -> Result<()> {
        self.call("/Remote", "de.tvdr.vdr.remote.Enable", &[]).await?;
        Ok(())
    }

    async fn remote_disable(&self) -> Result<()> {
        self.call("/Remote", "de.tvdr.vdr.remote.Disable", &[]).await?;
        Ok(())
    }

    async fn remote_enabled(&self) -> Result<bool> {
        let method = "de.tvdr.vdr.remote.Status";
        let reply = self.call("/Remote", method, &[]).await?;
        expect_bool(method, &reply)
    }

    async fn hit_key(&self, key: &str) -> Result<()> {
        self.call("/Remote", "de.tvdr.vdr.remote.HitKey", &[gvariant::quote(key)])
            .await?;
        Ok(())
    }

    async fn plugin_loaded(&self, name: &str) -> Result<bool> {
        let method = "de.tvdr.vdr.pluginmanager.List";
        let reply = self.call("/Plugins", method, &[]).await?;
        let needle = gvariant::quote(name);
        Ok(reply.iter().any(|value| match value {
            Value::Other(raw) => raw.contains(&needle),
            Value::Str(s) => s == name,
            _ => false,
        }))
    }

    async fn svdrp_command(&self, plugin: &str, command: &str, args: &str) -> Result<String> {
        let method = "de.tvdr.vdr.plugin.SVDRPCommand";
        let path = format!("/Plugins/{}", plugin);
        let reply = self
            .call(&path, method, &[gvariant::quote(command), gvariant::quote(args)])
            .await?;
        let code = expect_int(method, &reply)?;
        let message = reply
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if !(900..=999).contains(&code) {
            return Err(ArbiterError::rpc(
                format!("{} {}", plugin, command),
                format!("{} {}", code, message),
            ));
        }
        Ok(message)
    }

    async fn primary_device(&self) -> Result<String> {
        let method = "de.tvdr.vdr.device.GetPrimary";
        let reply = self.call("/Devices", method, &[]).await?;
        reply
            .last()
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ArbiterError::rpc(method, format!("no device name in {:?}", reply)))
    }

    async fn request_primary_by_name(&self, name: &str) -> Result<()> {
        let method = "de.tvdr.vdr.device.List";
        let reply = self.call("/Devices", method, &[]).await?;
        let Some(Value::Other(raw)) = reply.first() else {
            return Err(ArbiterError::rpc(method, format!("no device list in {:?}", reply)));
        };
        let index = gvariant::parse_tuple_array(raw)?
            .into_iter()
            .find(|device| device.last().and_then(|v| v.as_str()) == Some(name))
            .and_then(|device| device.first().and_then(|v| v.as_int()))
            .ok_or_else(|| ArbiterError::rpc(method, format!("no device named {}", name)))?;
        self.request_primary(index).await
    }

    async fn null_device(&self) -> Result<i64> {
        let method = "de.tvdr.vdr.device.GetNullDevice";
        let reply = self.call("/Devices", method, &[]).await?;
        expect_int(method, &reply)
    }

    async fn request_primary(&self, index: i64) -> Result<()> {
        self.call(
            "/Devices",
            "de.tvdr.vdr.device.RequestPrimary",
            &[format!("int32 {}", index)],
        )
        .await?;
        Ok(())
    }
}

/// Shutdown veto service on the bus
pub struct GdbusVeto {
    bus: String,
    config: VetoConfig,
    timeout: Duration,
}

impl GdbusVeto {
    pub fn new(host: &HostConfig, config: VetoConfig) -> Self {
        Self {
            bus: host.bus.clone(),
            config,
            timeout: Duration::from_millis(host.rpc_timeout_ms),
        }
    }
}

#[async_trait]
impl VetoService for GdbusVeto {
    async fn check(&self) -> Result<(bool, String)> {
        let method = format!("{}.Check", self.config.destination);
        let reply = gdbus_call(
            &self.bus,
            &self.config.destination,
            &self.config.path,
            &method,
            &[],
            self.timeout,
        )
        .await?;
        let ok = expect_bool(&method, &reply)?;
        let text = reply
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok((ok, text))
    }
}
