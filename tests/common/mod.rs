// Shared in-memory collaborators for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use vdr_frontend::config::{Config, XineConfig};
use vdr_frontend::controller::{Collaborators, Controller};
use vdr_frontend::desktop::{DeviceProbe, Wallpaper};
use vdr_frontend::drivers::{DriverContext, DriverFactory, FrontendDriver, KodiDriver, XineDriver};
use vdr_frontend::error::{ArbiterError, Result};
use vdr_frontend::event::{Event, Scheduler};
use vdr_frontend::host::{HostBus, VetoService};
use vdr_frontend::inhibitor::{Inhibitor, InhibitorLease};
use vdr_frontend::types::{AttachPolicy, AttachState, DriverKind, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Answer {
    #[default]
    Yes,
    No,
    Fail,
}

#[derive(Debug, Default)]
pub struct HostState {
    pub ready: bool,
    pub manual_start: bool,
    pub confirm: Answer,
    pub remote_enabled: bool,
    pub remote_changes: Vec<bool>,
    pub keys: Vec<String>,
    pub plugins: Vec<String>,
    pub svdrp: Vec<String>,
    pub primary: String,
}

#[derive(Default)]
pub struct MockHost {
    pub state: Mutex<HostState>,
}

impl MockHost {
    /// A host that is up and was started by the user
    pub fn ready() -> Arc<Self> {
        let host = Self::default();
        {
            let mut state = host.state.lock().unwrap();
            state.ready = true;
            state.manual_start = true;
        }
        Arc::new(host)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().keys.clone()
    }
}

#[async_trait]
impl HostBus for MockHost {
    async fn is_ready(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().ready)
    }

    async fn manual_start(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().manual_start)
    }

    async fn confirm_shutdown(&self, _user: bool) -> Result<bool> {
        match self.state.lock().unwrap().confirm {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            Answer::Fail => Err(ArbiterError::rpc("ConfirmShutdown", "no reply")),
        }
    }

    async fn remote_enable(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.remote_enabled = true;
        state.remote_changes.push(true);
        Ok(())
    }

    async fn remote_disable(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.remote_enabled = false;
        state.remote_changes.push(false);
        Ok(())
    }

    async fn remote_enabled(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().remote_enabled)
    }

    async fn hit_key(&self, key: &str) -> Result<()> {
        self.state.lock().unwrap().keys.push(key.to_string());
        Ok(())
    }

    async fn plugin_loaded(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().plugins.iter().any(|p| p == name))
    }

    async fn svdrp_command(&self, plugin: &str, command: &str, args: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .svdrp
            .push(format!("{} {} {}", plugin, command, args));
        Ok(String::new())
    }

    async fn primary_device(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().primary.clone())
    }

    async fn request_primary_by_name(&self, name: &str) -> Result<()> {
        self.state.lock().unwrap().primary = name.to_string();
        Ok(())
    }

    async fn null_device(&self) -> Result<i64> {
        Ok(0)
    }

    async fn request_primary(&self, index: i64) -> Result<()> {
        self.state.lock().unwrap().primary = format!("device{}", index);
        Ok(())
    }
}

pub struct MockVeto {
    pub answer: Mutex<Answer>,
}

impl MockVeto {
    pub fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
        })
    }
}

#[async_trait]
impl VetoService for MockVeto {
    async fn check(&self) -> Result<(bool, String)> {
        match *self.answer.lock().unwrap() {
            Answer::Yes => Ok((true, "ok".to_string())),
            Answer::No => Ok((false, "recording in progress".to_string())),
            Answer::Fail => Err(ArbiterError::rpc("Check", "service unknown")),
        }
    }
}

/// Reports the device busy for a number of checks, then free
#[derive(Default)]
pub struct MockProbe {
    pub remaining_busy: Mutex<usize>,
    pub checks: AtomicUsize,
}

impl MockProbe {
    pub fn busy_for(checks: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining_busy: Mutex::new(checks),
            checks: AtomicUsize::new(0),
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceProbe for MockProbe {
    async fn busy(&self) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let mut remaining = self.remaining_busy.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[derive(Default)]
pub struct NullWallpaper {
    pub set: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Wallpaper for NullWallpaper {
    async fn set(&self, path: &Path, _display: &str) -> Result<()> {
        self.set.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingInhibitor {
    pub acquired: AtomicUsize,
    pub released: Arc<AtomicUsize>,
}

impl CountingInhibitor {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Inhibitor for CountingInhibitor {
    fn acquire(&self, _who: &str, why: &str) -> Result<InhibitorLease> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        Ok(InhibitorLease::new(why, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[derive(Debug, Default)]
pub struct DriverLog {
    pub attached: bool,
    pub transitioning: bool,
    pub attaches: usize,
    pub detaches: usize,
    pub resumes: usize,
}

pub type SharedLog = Arc<Mutex<DriverLog>>;

/// Driver that only records what it was asked to do
pub struct MockDriver {
    kind: DriverKind,
    log: SharedLog,
}

impl MockDriver {
    pub fn new(kind: DriverKind, log: SharedLog) -> Self {
        Self { kind, log }
    }
}

#[async_trait]
impl FrontendDriver for MockDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn attach(&mut self, _options: Option<&str>) -> Result<bool> {
        let mut log = self.log.lock().unwrap();
        log.attaches += 1;
        log.attached = true;
        log.transitioning = false;
        Ok(true)
    }

    async fn detach(&mut self) -> Result<bool> {
        let mut log = self.log.lock().unwrap();
        log.detaches += 1;
        log.attached = false;
        log.transitioning = false;
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        let mut log = self.log.lock().unwrap();
        log.resumes += 1;
        log.attached = true;
        log.transitioning = false;
        Ok(true)
    }

    async fn status(&mut self) -> AttachState {
        let log = self.log.lock().unwrap();
        if log.transitioning {
            AttachState::Transitioning
        } else if log.attached {
            AttachState::Attached
        } else {
            AttachState::Detached
        }
    }
}

/// Builds mock drivers, or a real kodi driver when a command is given
pub struct MockFactory {
    pub vdr_kind: Option<DriverKind>,
    /// Builds a real xine driver running this command instead of a mock
    pub xine_command: Option<Vec<String>>,
    pub kodi_enabled: bool,
    pub kodi_command: Option<Vec<String>>,
    pub inhibitor: Arc<CountingInhibitor>,
    pub vdr: SharedLog,
    pub kodi: SharedLog,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self {
            vdr_kind: Some(DriverKind::Softhddevice),
            xine_command: None,
            kodi_enabled: true,
            kodi_command: None,
            inhibitor: Arc::new(CountingInhibitor::default()),
            vdr: SharedLog::default(),
            kodi: SharedLog::default(),
        }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn host_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>> {
        if let Some(command) = &self.xine_command {
            let config = XineConfig {
                command: command.clone(),
                ..Default::default()
            };
            return Some(Box::new(XineDriver::new(ctx, &config)));
        }
        self.vdr_kind
            .map(|kind| Box::new(MockDriver::new(kind, self.vdr.clone())) as Box<dyn FrontendDriver>)
    }

    fn application_driver(&self, ctx: DriverContext) -> Option<Box<dyn FrontendDriver>> {
        if let Some(command) = &self.kodi_command {
            let inhibitor: Arc<dyn Inhibitor> = self.inhibitor.clone();
            return Some(Box::new(KodiDriver::new(ctx, command.clone(), inhibitor)));
        }
        if self.kodi_enabled {
            Some(Box::new(MockDriver::new(DriverKind::Kodi, self.kodi.clone())))
        } else {
            None
        }
    }
}

pub fn test_config(frontend: Slot, attach: AttachPolicy) -> Config {
    let mut config = Config::default();
    config.frontend.frontend = frontend;
    config.frontend.attach = attach;
    config.frontend.bg_attached = Some(PathBuf::from("/usr/share/bg/attached.jpg"));
    config.frontend.bg_detached = Some(PathBuf::from("/usr/share/bg/detached.jpg"));
    config.frontend.release_timeout_ms = 2000;
    config.kodi.enabled = true;
    config.external.poll_interval_ms = 10;
    config.external.poll_timeout_ms = 2000;
    config
}

pub struct Harness {
    pub controller: Controller,
    pub scheduler: Scheduler,
    pub events: UnboundedReceiver<Event>,
    pub host: Arc<MockHost>,
    pub veto: Arc<MockVeto>,
    pub probe: Arc<MockProbe>,
    pub wallpaper: Arc<NullWallpaper>,
    pub inhibitor: Arc<CountingInhibitor>,
    pub vdr: SharedLog,
    pub kodi: SharedLog,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with(config, MockHost::ready(), MockFactory::default())
    }

    pub fn with(config: Config, host: Arc<MockHost>, factory: MockFactory) -> Self {
        let (scheduler, events) = Scheduler::channel();
        let veto = MockVeto::new(Answer::Yes);
        let probe = MockProbe::busy_for(0);
        let wallpaper = Arc::new(NullWallpaper::default());
        let inhibitor = factory.inhibitor.clone();
        let vdr = factory.vdr.clone();
        let kodi = factory.kodi.clone();

        let collaborators = Collaborators {
            host: host.clone(),
            veto: Some(veto.clone()),
            factory: Arc::new(factory),
            wallpaper: wallpaper.clone(),
            probe: probe.clone(),
        };
        let controller = Controller::new(config, collaborators, scheduler.clone());

        Self {
            controller,
            scheduler,
            events,
            host,
            veto,
            probe,
            wallpaper,
            inhibitor,
            vdr,
            kodi,
        }
    }

    pub async fn next_event(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event queue closed")
    }

    /// Handle the next queued event
    pub async fn pump(&mut self) -> bool {
        let event = self.next_event().await;
        self.controller.handle(event).await
    }

    pub fn attached_count(&self) -> usize {
        [&self.vdr, &self.kodi]
            .iter()
            .filter(|log| log.lock().unwrap().attached)
            .count()
    }
}
