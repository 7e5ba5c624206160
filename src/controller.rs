//! Frontend arbitration
//!
//! The controller owns one driver per slot and decides which of them holds the
//! display. All of its state is mutated from the single event loop in `run`, so
//! nothing here needs a lock.

use crate::config::Config;
use crate::control::{ControlReply, ControlRequest};
use crate::desktop::{self, DeviceProbe, DisplayHandle, Wallpaper};
use crate::drivers::{ChildExit, DriverContext, DriverFactory, DummyDriver, FrontendDriver};
use crate::error::ArbiterError;
use crate::event::{Event, Scheduler, Timer, TimerKind};
use crate::host::{HostBus, VetoService};
use crate::shutdown::ShutdownNegotiator;
use crate::supervisor::ExitCondition;
use crate::types::{AttachPolicy, AttachState, DriverKind, HostSignal, Slot};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything the controller talks to besides its own drivers
pub struct Collaborators {
    pub host: Arc<dyn HostBus>,
    pub veto: Option<Arc<dyn VetoService>>,
    pub factory: Arc<dyn DriverFactory>,
    pub wallpaper: Arc<dyn Wallpaper>,
    pub probe: Arc<dyn DeviceProbe>,
}

/// Which configured background to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Attached,
    Detached,
    /// Pick by the current attach state
    FromStatus,
}

/// One driver per slot; a slot without a real frontend holds the dummy driver
struct Drivers {
    vdr: Box<dyn FrontendDriver>,
    kodi: Box<dyn FrontendDriver>,
}

impl Drivers {
    fn get(&self, slot: Slot) -> &dyn FrontendDriver {
        match slot {
            Slot::Vdr => self.vdr.as_ref(),
            Slot::Kodi => self.kodi.as_ref(),
        }
    }

    fn get_mut(&mut self, slot: Slot) -> &mut dyn FrontendDriver {
        match slot {
            Slot::Vdr => self.vdr.as_mut(),
            Slot::Kodi => self.kodi.as_mut(),
        }
    }

    fn replace(&mut self, slot: Slot, driver: Box<dyn FrontendDriver>) -> Box<dyn FrontendDriver> {
        match slot {
            Slot::Vdr => std::mem::replace(&mut self.vdr, driver),
            Slot::Kodi => std::mem::replace(&mut self.kodi, driver),
        }
    }
}

/// A `beginExternal` call waiting for the audio device to be released
struct ExternalWait {
    reply: oneshot::Sender<bool>,
    deadline: Instant,
    timer: Option<Timer>,
}

/// A switch whose outgoing child has not exited yet
struct PendingSwitch {
    from: Slot,
    timer: Timer,
}

pub struct Controller {
    config: Config,
    host: Arc<dyn HostBus>,
    negotiator: ShutdownNegotiator,
    factory: Arc<dyn DriverFactory>,
    wallpaper: Arc<dyn Wallpaper>,
    probe: Arc<dyn DeviceProbe>,
    scheduler: Scheduler,
    display: DisplayHandle,
    drivers: Drivers,
    order: Vec<Slot>,
    cursor: usize,
    current: Option<Slot>,
    external: bool,
    host_ready: bool,
    wants_shutdown: bool,
    expect_stop: bool,
    deferred_shutdown: Option<Timer>,
    external_wait: Option<ExternalWait>,
    pending_switch: Option<PendingSwitch>,
}

impl Controller {
    pub fn new(config: Config, collaborators: Collaborators, scheduler: Scheduler) -> Self {
        let order = Slot::ALL.to_vec();
        let cursor = order
            .iter()
            .position(|slot| *slot == config.frontend.frontend)
            .unwrap_or(0);
        let display = DisplayHandle::new(config.frontend.display.clone());
        let negotiator = ShutdownNegotiator::new(collaborators.host.clone(), collaborators.veto);

        Self {
            config,
            host: collaborators.host,
            negotiator,
            factory: collaborators.factory,
            wallpaper: collaborators.wallpaper,
            probe: collaborators.probe,
            scheduler,
            display,
            drivers: Drivers {
                vdr: Box::new(DummyDriver),
                kodi: Box::new(DummyDriver),
            },
            order,
            cursor,
            current: None,
            external: false,
            host_ready: false,
            wants_shutdown: false,
            expect_stop: false,
            deferred_shutdown: None,
            external_wait: None,
            pending_switch: None,
        }
    }

    pub fn current(&self) -> Option<Slot> {
        self.current
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn host_ready(&self) -> bool {
        self.host_ready
    }

    pub fn wants_shutdown(&self) -> bool {
        self.wants_shutdown
    }

    pub fn driver_kind(&self, slot: Slot) -> DriverKind {
        self.drivers.get(slot).kind()
    }

    pub fn display(&self) -> DisplayHandle {
        self.display.clone()
    }

    fn context(&self, slot: Slot) -> DriverContext {
        DriverContext {
            slot,
            host: self.host.clone(),
            scheduler: self.scheduler.clone(),
            display: self.display.clone(),
        }
    }

    fn set_current(&mut self, slot: Slot) {
        self.current = Some(slot);
        if let Some(index) = self.order.iter().position(|s| *s == slot) {
            self.cursor = index;
        }
    }

    /// Put `driver` into `slot`; the superseded driver is detached and dropped
    async fn install(&mut self, slot: Slot, driver: Option<Box<dyn FrontendDriver>>) {
        let driver = driver.unwrap_or_else(|| {
            warn!("{}, using dummy frontend", ArbiterError::Resolution(slot.to_string()));
            Box::new(DummyDriver)
        });
        let mut old = self.drivers.replace(slot, driver);
        if old.status().await.is_engaged() {
            debug!("detaching superseded {} frontend {}", slot, old.name());
            if let Err(e) = old.detach().await {
                warn!("could not detach superseded {}: {}", old.name(), e);
            }
        }
        debug!(
            "{} slot now uses {} (was {})",
            slot,
            self.drivers.get(slot).name(),
            old.name()
        );
    }

    // Best-effort host calls

    async fn host_is_ready(&self) -> bool {
        match self.host.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Could not query vdr status: {}", e);
                false
            }
        }
    }

    async fn set_remote(&self, enabled: bool) {
        let result = if enabled {
            self.host.remote_enable().await
        } else {
            self.host.remote_disable().await
        };
        if let Err(e) = result {
            warn!(
                "Could not {} vdr remote: {}",
                if enabled { "enable" } else { "disable" },
                e
            );
        }
    }

    // Lifecycle

    /// Build the drivers right away if the host is already up, else wait for it
    pub async fn start(&mut self) {
        if self.host_is_ready().await {
            self.host_ready = true;
            self.prepare().await;
        } else {
            info!("vdr not ready yet, waiting for it");
        }
    }

    /// Resolve both slots and run the startup policy
    pub async fn prepare(&mut self) {
        let vdr = self.factory.host_driver(self.context(Slot::Vdr)).await;
        self.install(Slot::Vdr, vdr).await;

        if self.current == Some(Slot::Kodi) {
            debug!("keeping the running kodi frontend");
        } else {
            let kodi = self.factory.application_driver(self.context(Slot::Kodi));
            self.install(Slot::Kodi, kodi).await;
        }

        let configured = self.config.frontend.frontend;
        if let Some(index) = self.order.iter().position(|s| *s == configured) {
            self.cursor = index;
        }
        debug!("set main frontend to {}", configured);
        self.startup().await;
    }

    /// Rebuild the host-native driver after the host came back
    pub async fn restart(&mut self) {
        if let Err(e) = self.drivers.get_mut(Slot::Vdr).detach().await {
            debug!("detaching the previous vdr frontend failed: {}", e);
        }
        let vdr = self.factory.host_driver(self.context(Slot::Vdr)).await;
        self.install(Slot::Vdr, vdr).await;
        self.startup().await;
    }

    pub async fn startup(&mut self) {
        let wakeup = self.check_wakeup().await;
        let policy = self.config.frontend.attach;
        debug!("running startup(): attach {:?}, manual start {}", policy, wakeup);

        if policy == AttachPolicy::Never || (policy == AttachPolicy::Auto && !wakeup) {
            self.set_current(self.config.frontend.frontend);
            self.apply_background(Background::FromStatus).await;
            return;
        }

        match self.current.unwrap_or(self.config.frontend.frontend) {
            Slot::Kodi => {
                if let Err(e) = self.drivers.get_mut(Slot::Kodi).attach(None).await {
                    warn!("startup: could not attach kodi: {}", e);
                }
                self.set_current(Slot::Kodi);
                self.set_remote(false).await;
                debug!("startup: frontend is kodi");
            }
            Slot::Vdr => {
                if self.host_is_ready().await {
                    self.host_ready = true;
                    if let Err(e) = self.drivers.get_mut(Slot::Vdr).resume().await {
                        warn!("startup: could not resume vdr frontend: {}", e);
                    }
                    self.set_current(Slot::Vdr);
                    debug!("startup: using vdr frontend {}", self.drivers.get(Slot::Vdr).name());
                } else {
                    debug!("vdr not ready");
                    self.host_ready = false;
                }
            }
        }
    }

    /// True if the host was started by the user rather than a timer or plugin
    pub async fn check_wakeup(&self) -> bool {
        if !self.host_is_ready().await {
            return true;
        }
        match self.host.manual_start().await {
            Ok(manual) => manual,
            Err(e) => {
                warn!("Could not query start reason, assuming manual start: {}", e);
                true
            }
        }
    }

    // Control surface

    pub async fn status(&mut self) -> AttachState {
        match self.current {
            None => AttachState::Detached,
            Some(_) if self.external => AttachState::External,
            Some(slot) => self.drivers.get_mut(slot).status().await,
        }
    }

    pub async fn toggle(&mut self) -> bool {
        if self.status().await == AttachState::Attached {
            self.detach().await;
        } else if let Some(slot) = self.current.filter(|_| !self.external) {
            if let Err(e) = self.drivers.get_mut(slot).resume().await {
                warn!("could not resume {}: {}", slot, e);
            }
        }
        true
    }

    pub fn describe(&self) -> String {
        match self.current {
            Some(slot) => format!("current frontend is {}", self.drivers.get(slot).name()),
            None => "current frontend is none".to_string(),
        }
    }

    /// Hand the display to the next slot in switch order
    pub async fn switch_frontend(&mut self) -> String {
        if self.status().await == AttachState::Transitioning {
            debug!("current frontend is still starting, resuming it first");
            self.resume().await;
        }
        if self.current == Some(Slot::Vdr) {
            self.set_remote(false).await;
        }
        // A newer switch supersedes one still waiting for its outgoing child
        self.pending_switch = None;

        let old = self.current;
        self.cursor = (self.cursor + 1) % self.order.len();
        let next = self.order[self.cursor];
        self.current = Some(next);
        debug!("next frontend is {}", next);

        if let Some(old) = old.filter(|old| *old != next) {
            let outgoing = self.drivers.get_mut(old);
            if outgoing.status().await.is_engaged() {
                let result = outgoing.detach().await;
                if let Err(e) = result {
                    warn!("could not detach {}: {}", outgoing.name(), e);
                }
            }
            if self.drivers.get(old).pending_release() {
                debug!("waiting for {} to release the device", self.drivers.get(old).name());
                let timeout = Duration::from_millis(self.config.frontend.release_timeout_ms);
                self.pending_switch = Some(PendingSwitch {
                    from: old,
                    timer: self.scheduler.after(timeout, TimerKind::ReleaseTimeout),
                });
                return self.describe();
            }
        }

        self.complete_switch().await;
        self.describe()
    }

    async fn complete_switch(&mut self) {
        self.pending_switch = None;
        self.attach(None).await;
        if self.current == Some(Slot::Vdr) {
            self.set_remote(true).await;
            if self.wants_shutdown {
                self.wants_shutdown = false;
                self.press_power().await;
            }
        }
        debug!("frontend after switch: {}", self.describe());
    }

    pub async fn attach(&mut self, options: Option<&str>) -> bool {
        if self.deferred_shutdown.take().is_some() {
            debug!("cancelled deferred shutdown");
        }
        if self.external {
            debug!("external mode active, not attaching");
            return false;
        }
        let Some(slot) = self.current else {
            warn!("attach: no current frontend");
            return false;
        };
        self.apply_background(Background::Attached).await;
        match self.drivers.get_mut(slot).attach(options).await {
            Ok(attached) => attached,
            Err(e) => {
                warn!("{}", ArbiterError::Transition(format!("attach {}: {}", slot, e)));
                false
            }
        }
    }

    pub async fn detach(&mut self) -> bool {
        self.detach_with(true, true).await
    }

    pub async fn detach_with(&mut self, set_background: bool, expect_stop: bool) -> bool {
        self.expect_stop = expect_stop;
        let Some(slot) = self.current else {
            debug!("detach: no current frontend");
            return true;
        };
        let detached = match self.drivers.get_mut(slot).detach().await {
            Ok(detached) => detached,
            Err(e) => {
                warn!("{}", ArbiterError::Transition(format!("detach {}: {}", slot, e)));
                false
            }
        };
        if detached && set_background {
            self.apply_background(Background::Detached).await;
        }
        detached
    }

    pub async fn resume(&mut self) -> bool {
        if self.external {
            debug!("external mode active, not resuming");
            return false;
        }
        let Some(slot) = self.current else {
            warn!("resume: no current frontend");
            return false;
        };
        let resumed = match self.drivers.get_mut(slot).resume().await {
            Ok(resumed) => resumed,
            Err(e) => {
                warn!("{}", ArbiterError::Transition(format!("resume {}: {}", slot, e)));
                false
            }
        };
        self.set_remote(true).await;
        self.apply_background(Background::Attached).await;
        resumed
    }

    /// Give the display to an unmanaged consumer
    ///
    /// `reply` receives true once no managed frontend holds the audio device,
    /// or false if that does not happen within the poll timeout.
    pub async fn begin_external(&mut self, reply: oneshot::Sender<bool>) {
        self.external = true;
        self.detach_with(false, true).await;

        if let Some(previous) = self.external_wait.take() {
            let _ = previous.reply.send(false);
        }
        let timeout = Duration::from_millis(self.config.external.poll_timeout_ms);
        self.external_wait = Some(ExternalWait {
            reply,
            deadline: Instant::now() + timeout,
            timer: None,
        });
        self.poll_device().await;
    }

    async fn poll_device(&mut self) {
        if self.external_wait.is_none() {
            return;
        }
        debug!("check if frontend has freed sound device");
        let busy = match self.probe.busy().await {
            Ok(busy) => busy,
            Err(e) => {
                warn!("Could not check the sound device, assuming it is free: {}", e);
                false
            }
        };

        let Some(mut wait) = self.external_wait.take() else {
            return;
        };
        if !busy {
            debug!("frontend has freed sound device");
            let _ = wait.reply.send(true);
        } else if Instant::now() >= wait.deadline {
            let timeout = Duration::from_millis(self.config.external.poll_timeout_ms);
            warn!(
                "{}",
                ArbiterError::Timeout("waiting for the sound device".to_string(), timeout)
            );
            let _ = wait.reply.send(false);
        } else {
            let interval = Duration::from_millis(self.config.external.poll_interval_ms);
            wait.timer = Some(self.scheduler.after(interval, TimerKind::DevicePoll));
            self.external_wait = Some(wait);
        }
    }

    pub async fn end_external(&mut self) -> bool {
        self.external = false;
        if let Some(wait) = self.external_wait.take() {
            debug!("external mode ended before the sound device was free");
            let _ = wait.reply.send(false);
        }
        self.attach(None).await;
        true
    }

    /// Detach and ask for a shutdown after the configured delay unless something attaches first
    pub async fn soft_detach(&mut self) -> bool {
        debug!("running soft_detach");
        if matches!(
            self.config.frontend.attach,
            AttachPolicy::Auto | AttachPolicy::Always
        ) {
            self.detach().await;
        }
        let delay = Duration::from_millis(self.config.frontend.shutdown_delay_ms);
        debug!("add timer for send_shutdown in {:?}", delay);
        self.deferred_shutdown = Some(self.scheduler.after(delay, TimerKind::DeferredShutdown));
        true
    }

    pub async fn init_shutdown(&mut self) -> bool {
        if let Some(slot) = self.current {
            if !self.drivers.get(slot).survives_power_key() {
                debug!("detaching {} before shutdown", self.drivers.get(slot).name());
                self.detach().await;
            }
        }
        self.send_shutdown(false).await
    }

    /// Press the host's power key if the shutdown is approved
    pub async fn send_shutdown(&mut self, user: bool) -> bool {
        if self.negotiator.request(user).await {
            debug!("send 'HitKey POWER' to vdr");
            self.press_power().await;
            true
        } else {
            debug!("send_shutdown: vdr not ready to shut down");
            false
        }
    }

    /// Send POWER, enabling the host's remote for the duration if it was off
    pub async fn press_power(&self) {
        let restore = match self.host.remote_enabled().await {
            Ok(enabled) => !enabled,
            Err(e) => {
                debug!("Could not query vdr remote status: {}", e);
                true
            }
        };
        if restore {
            self.set_remote(true).await;
        }
        if let Err(e) = self.host.hit_key("POWER").await {
            warn!("Could not send POWER to vdr: {}", e);
        }
        if restore {
            self.set_remote(false).await;
        }
    }

    pub async fn apply_background(&mut self, background: Background) {
        let frontend = &self.config.frontend;
        let path = match background {
            Background::Attached => frontend.bg_attached.clone(),
            Background::Detached => frontend.bg_detached.clone(),
            Background::FromStatus => {
                let (attached, detached) = (frontend.bg_attached.clone(), frontend.bg_detached.clone());
                match self.status().await {
                    AttachState::Detached => detached,
                    AttachState::Attached => attached,
                    _ => None,
                }
            }
        };
        let Some(path) = path else {
            return;
        };
        if let Err(e) = self.wallpaper.set(&path, &self.display.get()).await {
            warn!("Could not set background {}: {}", path.display(), e);
        }
    }

    pub fn set_display(&mut self, display: Option<String>) -> bool {
        match display.filter(|d| !d.is_empty()) {
            Some(screen) => {
                debug!("DISPLAY is now {}", screen);
                self.display.set(screen);
                true
            }
            None => false,
        }
    }

    pub fn get_display(&self) -> String {
        self.display.get()
    }

    /// Show the attached background and re-resolve the display's screen
    pub async fn temp_display(&mut self) -> String {
        self.apply_background(Background::Attached).await;
        let display = desktop::resolve_display(
            &self.config.frontend.display,
            self.config.frontend.get_tempdisplay.as_deref(),
        )
        .await;
        self.display.set(display.clone());
        display
    }

    // Host signals

    pub async fn on_host_ready(&mut self) {
        info!("vdr ready");
        self.host_ready = true;
        if self.current == Some(Slot::Kodi) {
            self.restart().await;
        } else {
            self.prepare().await;
        }
    }

    pub fn on_host_stop(&mut self) {
        if self.expect_stop {
            debug!("vdr stopping");
        } else {
            info!("vdr stopped");
        }
        self.expect_stop = false;
        self.host_ready = false;
        if self.current == Some(Slot::Vdr) {
            self.current = None;
        }
    }

    // Children and timers

    pub async fn on_child_exit(&mut self, slot: Slot, pid: u32, raw_status: i32) {
        let condition = ExitCondition::classify(raw_status);
        debug!("pid {} of {} exited with {} ({:?})", pid, slot, raw_status, condition);

        match self.drivers.get_mut(slot).on_exit(pid, condition) {
            ChildExit::Stale => debug!("ignoring exit of stale child {}", pid),
            ChildExit::Released => {
                let waiting = self
                    .pending_switch
                    .as_ref()
                    .map_or(false, |pending| pending.from == slot);
                if waiting && !self.drivers.get(slot).pending_release() {
                    debug!("{} released the device", slot);
                    self.complete_switch().await;
                }
            }
            ChildExit::Exited(condition) => self.react_to_exit(slot, condition).await,
        }
    }

    async fn react_to_exit(&mut self, slot: Slot, condition: ExitCondition) {
        let name = self.drivers.get(slot).name().to_string();
        match condition {
            ExitCondition::Normal => {
                info!("normal {} exit", name);
                if self.current == Some(slot) {
                    self.switch_frontend().await;
                }
            }
            ExitCondition::Abnormal(status) => {
                warn!(
                    "{}",
                    ArbiterError::Supervision(format!("{} exited abnormally: {}", name, status))
                );
                if self.external {
                    return;
                }
                if let Some(current) = self.current {
                    if let Err(e) = self.drivers.get_mut(current).resume().await {
                        warn!("could not resume {}: {}", current, e);
                    }
                }
            }
            ExitCondition::ShutdownRequested => {
                info!("{} wants a shutdown", name);
                self.wants_shutdown = true;
                self.switch_frontend().await;
            }
            ExitCondition::RebootRequested => {
                info!("{} wants a reboot", name);
                self.switch_frontend().await;
            }
        }
    }

    pub async fn on_timer(&mut self, generation: u64, kind: TimerKind) {
        match kind {
            TimerKind::DeferredShutdown => {
                if self.deferred_shutdown.as_ref().map_or(false, |t| t.matches(generation)) {
                    self.deferred_shutdown = None;
                    info!("deferred shutdown timer expired");
                    self.send_shutdown(false).await;
                    return;
                }
            }
            TimerKind::DevicePoll => {
                let armed = self
                    .external_wait
                    .as_ref()
                    .and_then(|wait| wait.timer.as_ref())
                    .map_or(false, |t| t.matches(generation));
                if armed {
                    self.poll_device().await;
                    return;
                }
            }
            TimerKind::DriverRetry(slot) => {
                match self.drivers.get_mut(slot).retry(generation).await {
                    Ok(true) => info!("{} attached after retry", slot),
                    Ok(false) => {}
                    Err(e) => warn!("{}", e),
                }
                return;
            }
            TimerKind::ReleaseTimeout => {
                if let Some(pending) = &self.pending_switch {
                    if pending.timer.matches(generation) {
                        warn!("{} did not exit in time, attaching anyway", pending.from);
                        self.complete_switch().await;
                        return;
                    }
                }
            }
        }
        debug!("ignoring stale {:?} timer {}", kind, generation);
    }

    /// Handle one event; returns false once the daemon should exit
    pub async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Control { request, reply } => return self.dispatch(request, reply).await,
            Event::Host(HostSignal::HostReady) => self.on_host_ready().await,
            Event::Host(HostSignal::HostStopped) => self.on_host_stop(),
            Event::ChildExited {
                slot,
                pid,
                raw_status,
            } => self.on_child_exit(slot, pid, raw_status).await,
            Event::Timer { generation, kind } => self.on_timer(generation, kind).await,
        }
        true
    }

    async fn dispatch(&mut self, request: ControlRequest, reply: oneshot::Sender<ControlReply>) -> bool {
        let answer = match request {
            ControlRequest::Status => ControlReply::Int(self.status().await.code()),
            ControlRequest::ToggleFrontend => ControlReply::Bool(self.toggle().await),
            ControlRequest::SwitchFrontend => ControlReply::Text(self.switch_frontend().await),
            ControlRequest::GetFrontend => ControlReply::Text(self.describe()),
            ControlRequest::Attach { options } => {
                ControlReply::Bool(self.attach(options.as_deref()).await)
            }
            ControlRequest::Detach => ControlReply::Bool(self.detach().await),
            ControlRequest::Resume => ControlReply::Bool(self.resume().await),
            ControlRequest::BeginExternal => {
                let (tx, rx) = oneshot::channel();
                self.begin_external(tx).await;
                // Answered once the device is free; the loop keeps running meanwhile
                tokio::spawn(async move {
                    let freed = rx.await.unwrap_or(false);
                    let _ = reply.send(ControlReply::Bool(freed));
                });
                return true;
            }
            ControlRequest::EndExternal => ControlReply::Bool(self.end_external().await),
            ControlRequest::SoftDetach => ControlReply::Bool(self.soft_detach().await),
            ControlRequest::InitShutdown => ControlReply::Bool(self.init_shutdown().await),
            ControlRequest::SendShutdown { user } => {
                ControlReply::Bool(self.send_shutdown(user).await)
            }
            ControlRequest::SetDisplay { display } => ControlReply::Bool(self.set_display(display)),
            ControlRequest::GetDisplay => ControlReply::Text(self.get_display()),
            ControlRequest::TempDisplay => ControlReply::Text(self.temp_display().await),
            ControlRequest::Quit => {
                info!("quit frontend script");
                self.terminate().await;
                let _ = reply.send(ControlReply::Unit);
                return false;
            }
        };
        let _ = reply.send(answer);
        true
    }

    /// Detach the current frontend and give the device a moment to settle
    pub async fn terminate(&mut self) {
        if let Some(slot) = self.current {
            if let Err(e) = self.drivers.get_mut(slot).detach().await {
                error!("Could not detach {} on exit: {}", slot, e);
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Serve events until `quit` or a termination signal
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<Event>) -> anyhow::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if !self.handle(event).await {
                        break;
                    }
                }
                _ = sigterm.recv() => {
                    info!("got SIGTERM");
                    self.terminate().await;
                    break;
                }
                _ = sigint.recv() => {
                    info!("got SIGINT");
                    self.terminate().await;
                    break;
                }
            }
        }
        Ok(())
    }
}

