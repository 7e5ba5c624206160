use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, Level};
use vdr_frontend::config::{Config, LoggingConfig};
use vdr_frontend::control::{self, ControlRequest};
use vdr_frontend::controller::{Collaborators, Controller};
use vdr_frontend::desktop::{self, FehWallpaper, FuserProbe};
use vdr_frontend::drivers::DefaultDriverFactory;
use vdr_frontend::event::Scheduler;
use vdr_frontend::host::{GdbusHost, GdbusVeto, HostBus, VetoService};
use vdr_frontend::host_watcher;
use vdr_frontend::inhibitor::{Inhibitor, SystemdInhibitor};

const DEFAULT_CONFIG: &str = "/etc/vdr-frontend/config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "vdr-frontend",
    about = "Arbitrates the display between vdr output plugins and kodi",
    version
)]
struct Cli {
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Send one request to a running daemon and print its result
    Call {
        /// Control method, e.g. switchFrontend or setDisplay
        method: String,
        /// Argument for attach, setDisplay or sendShutdown
        arg: Option<String>,
    },
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let level: Level = logging.loglevel.parse().unwrap_or(Level::DEBUG);
    let builder = tracing_subscriber::fmt().with_max_level(level);

    if logging.use_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.logfile)
            .with_context(|| format!("Failed to open log file {}", logging.logfile.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

async fn run_client(config: &Config, method: &str, arg: Option<&str>) -> Result<()> {
    let request = ControlRequest::from_args(method, arg)?;
    let response = control::call(&config.control.socket_path, &request).await?;
    if !response.ok {
        bail!(response.error.unwrap_or_else(|| "request failed".to_string()));
    }
    if let Some(result) = response.result {
        println!("{}", result);
    }
    Ok(())
}

async fn run_daemon(config: Config) -> Result<()> {
    info!("vdr-frontend starting");

    let (scheduler, events) = Scheduler::channel();

    let host: Arc<dyn HostBus> = Arc::new(GdbusHost::new(config.host.clone()));
    let veto: Option<Arc<dyn VetoService>> = if config.veto.enabled {
        Some(Arc::new(GdbusVeto::new(&config.host, config.veto.clone())))
    } else {
        None
    };
    let inhibitor: Arc<dyn Inhibitor> = Arc::new(SystemdInhibitor::new());

    let collaborators = Collaborators {
        host: host.clone(),
        veto,
        factory: Arc::new(DefaultDriverFactory::new(config.clone(), inhibitor)),
        wallpaper: Arc::new(FehWallpaper),
        probe: Arc::new(FuserProbe::new(config.external.clone())),
    };
    let mut controller = Controller::new(config.clone(), collaborators, scheduler.clone());

    let display = desktop::resolve_display(
        &config.frontend.display,
        config.frontend.get_tempdisplay.as_deref(),
    )
    .await;
    controller.set_display(Some(display));

    let listener = control::bind(&config.control.socket_path).await?;
    tokio::spawn(control::serve(listener, scheduler.clone()));

    let initially_ready = host.is_ready().await.unwrap_or(false);
    tokio::spawn(host_watcher::run(
        config.host.clone(),
        scheduler.clone(),
        initially_ready,
    ));

    controller.start().await;
    let result = controller.run(events).await;

    let _ = std::fs::remove_file(&config.control.socket_path);
    info!("vdr-frontend stopped");
    result
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Call { method, arg }) = &cli.command {
        let config = Config::from_file(&cli.config).unwrap_or_else(|e| {
            eprintln!("Using default settings, could not read {}: {}", cli.config.display(), e);
            Config::default()
        });
        return run_client(&config, method, arg.as_deref()).await;
    }

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_logging(&config.logging)?;
    info!("Configuration loaded from {}", cli.config.display());

    if let Err(e) = run_daemon(config).await {
        error!("vdr-frontend failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_args() {
        let cli = Cli::try_parse_from(["vdr-frontend"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_call_mode() {
        let cli =
            Cli::try_parse_from(["vdr-frontend", "-c", "/tmp/f.toml", "call", "setDisplay", ":1"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/f.toml"));
        assert_eq!(
            cli.command,
            Some(Command::Call {
                method: "setDisplay".to_string(),
                arg: Some(":1".to_string())
            })
        );

        let cli = Cli::try_parse_from(["vdr-frontend", "call", "switchFrontend"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Call {
                method: "switchFrontend".to_string(),
                arg: None
            })
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(Cli::try_parse_from(["vdr-frontend", "--frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["vdr-frontend", "-c"]).is_err());
        assert!(Cli::try_parse_from(["vdr-frontend", "call"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
