mod common;

use common::{Answer, Harness, MockFactory, MockHost};
use std::time::Duration;
use tokio::sync::oneshot;
use vdr_frontend::host_watcher::{HostStatusWatcher, RawHostEvent};
use vdr_frontend::types::{AttachPolicy, AttachState, DriverKind, HostSignal, Slot};

async fn started(frontend: Slot, attach: AttachPolicy) -> Harness {
    let mut h = Harness::new(common::test_config(frontend, attach));
    h.controller.start().await;
    h
}

#[tokio::test]
async fn test_start_attaches_configured_vdr_frontend() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;

    assert_eq!(h.controller.current(), Some(Slot::Vdr));
    assert!(h.controller.host_ready());
    assert_eq!(h.controller.driver_kind(Slot::Vdr), DriverKind::Softhddevice);
    assert_eq!(h.controller.driver_kind(Slot::Kodi), DriverKind::Kodi);
    assert_eq!(h.vdr.lock().unwrap().resumes, 1);
    assert_eq!(h.controller.status().await, AttachState::Attached);
}

#[tokio::test]
async fn test_switch_scenario_round_trip() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;

    let description = h.controller.switch_frontend().await;
    assert!(description.contains("kodi"), "{}", description);
    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert_eq!(h.vdr.lock().unwrap().detaches, 1);
    assert_eq!(h.kodi.lock().unwrap().attaches, 1);
    assert!(!h.vdr.lock().unwrap().attached);
    assert!(h.kodi.lock().unwrap().attached);

    let description = h.controller.switch_frontend().await;
    assert_eq!(description, "current frontend is softhddevice");
    assert_eq!(h.controller.current(), Some(Slot::Vdr));
    assert_eq!(h.kodi.lock().unwrap().detaches, 1);
    assert!(h.vdr.lock().unwrap().attached);
}

#[tokio::test]
async fn test_at_most_one_attached_across_switches() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    assert!(h.attached_count() <= 1);

    for _ in 0..7 {
        h.controller.switch_frontend().await;
        assert!(h.attached_count() <= 1);
    }
    // Odd number of switches from vdr lands on kodi
    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert_eq!(h.attached_count(), 1);
}

#[tokio::test]
async fn test_switch_order_wraps_around_slots() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        h.controller.switch_frontend().await;
        seen.push(h.controller.current().unwrap());
    }
    assert_eq!(seen, vec![Slot::Vdr, Slot::Kodi, Slot::Vdr, Slot::Kodi]);
}

#[tokio::test]
async fn test_switch_toggles_host_remote() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    h.host.state.lock().unwrap().remote_changes.clear();

    h.controller.switch_frontend().await;
    assert_eq!(h.host.state.lock().unwrap().remote_changes, vec![false]);

    h.controller.switch_frontend().await;
    assert_eq!(h.host.state.lock().unwrap().remote_changes, vec![false, true]);
}

#[tokio::test]
async fn test_switch_resumes_half_started_frontend_first() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    h.vdr.lock().unwrap().transitioning = true;

    h.controller.switch_frontend().await;

    let vdr = h.vdr.lock().unwrap();
    assert_eq!(vdr.resumes, 2);
    assert_eq!(vdr.detaches, 1);
}

#[tokio::test]
async fn test_never_policy_does_not_attach() {
    for manual in [true, false] {
        let host = MockHost::ready();
        host.state.lock().unwrap().manual_start = manual;
        let mut h = Harness::with(
            common::test_config(Slot::Vdr, AttachPolicy::Never),
            host,
            MockFactory::default(),
        );
        h.controller.start().await;

        for log in [&h.vdr, &h.kodi] {
            let log = log.lock().unwrap();
            assert_eq!(log.attaches, 0);
            assert_eq!(log.resumes, 0);
        }
        assert_eq!(h.controller.current(), Some(Slot::Vdr));
        assert_eq!(h.controller.status().await, AttachState::Detached);
    }
}

#[tokio::test]
async fn test_auto_policy_follows_wakeup_reason() {
    let host = MockHost::ready();
    host.state.lock().unwrap().manual_start = false;
    let mut h = Harness::with(
        common::test_config(Slot::Vdr, AttachPolicy::Auto),
        host,
        MockFactory::default(),
    );
    h.controller.start().await;
    assert_eq!(h.vdr.lock().unwrap().resumes, 0);
    assert_eq!(h.controller.status().await, AttachState::Detached);
    // Detached background shown for a timer start
    assert_eq!(
        h.wallpaper.set.lock().unwrap().last().unwrap().to_str(),
        Some("/usr/share/bg/detached.jpg")
    );

    let mut h = started(Slot::Vdr, AttachPolicy::Auto).await;
    assert_eq!(h.vdr.lock().unwrap().resumes, 1);
    assert_eq!(h.controller.current(), Some(Slot::Vdr));
    assert_eq!(h.controller.status().await, AttachState::Attached);
}

#[tokio::test]
async fn test_check_wakeup() {
    let h = Harness::new(common::test_config(Slot::Vdr, AttachPolicy::Auto));
    assert!(h.controller.check_wakeup().await);

    h.host.state.lock().unwrap().manual_start = false;
    assert!(!h.controller.check_wakeup().await);

    // Without a running host the start is treated as manual
    h.host.state.lock().unwrap().ready = false;
    assert!(h.controller.check_wakeup().await);
}

#[tokio::test]
async fn test_startup_with_kodi_frontend() {
    let h = started(Slot::Kodi, AttachPolicy::Always).await;

    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert_eq!(h.kodi.lock().unwrap().attaches, 1);
    assert_eq!(h.vdr.lock().unwrap().resumes, 0);
    assert_eq!(h.host.state.lock().unwrap().remote_changes, vec![false]);
}

#[tokio::test]
async fn test_host_not_ready_waits() {
    let host = std::sync::Arc::new(MockHost::default());
    let mut h = Harness::with(
        common::test_config(Slot::Vdr, AttachPolicy::Always),
        host,
        MockFactory::default(),
    );
    h.controller.start().await;

    assert_eq!(h.controller.current(), None);
    assert_eq!(h.controller.driver_kind(Slot::Vdr), DriverKind::Dummy);

    h.host.state.lock().unwrap().ready = true;
    h.controller.on_host_ready().await;
    assert_eq!(h.controller.current(), Some(Slot::Vdr));
    assert_eq!(h.controller.driver_kind(Slot::Vdr), DriverKind::Softhddevice);
}

#[tokio::test]
async fn test_missing_frontends_become_dummies() {
    let factory = MockFactory {
        vdr_kind: None,
        kodi_enabled: false,
        ..Default::default()
    };
    let mut h = Harness::with(
        common::test_config(Slot::Vdr, AttachPolicy::Always),
        MockHost::ready(),
        factory,
    );
    h.controller.start().await;

    assert_eq!(h.controller.driver_kind(Slot::Vdr), DriverKind::Dummy);
    assert_eq!(h.controller.driver_kind(Slot::Kodi), DriverKind::Dummy);
    assert_eq!(h.controller.describe(), "current frontend is dummy");
    assert!(h.controller.attach(None).await);
    assert!(h.controller.detach().await);
    assert_eq!(h.controller.switch_frontend().await, "current frontend is dummy");
    assert_eq!(h.controller.status().await, AttachState::Detached);
}

#[tokio::test]
async fn test_external_round_trip_restores_state() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;

    let (tx, rx) = oneshot::channel();
    h.controller.begin_external(tx).await;
    assert!(rx.await.unwrap());
    assert!(h.controller.is_external());
    assert_eq!(h.controller.status().await, AttachState::External);
    assert_eq!(h.controller.status().await.code(), 3);
    assert!(!h.kodi.lock().unwrap().attached);
    // Detaching for an external consumer leaves the background alone
    assert!(h
        .wallpaper
        .set
        .lock()
        .unwrap()
        .iter()
        .all(|p| !p.ends_with("detached.jpg")));

    assert!(!h.controller.attach(None).await);
    assert!(!h.controller.resume().await);

    assert!(h.controller.end_external().await);
    assert!(!h.controller.is_external());
    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert!(h.kodi.lock().unwrap().attached);
}

#[tokio::test]
async fn test_begin_external_waits_for_device() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;
    *h.probe.remaining_busy.lock().unwrap() = 2;

    let (tx, mut rx) = oneshot::channel();
    h.controller.begin_external(tx).await;
    assert!(rx.try_recv().is_err(), "device still busy");

    h.pump().await;
    assert!(rx.try_recv().is_err(), "device still busy");

    h.pump().await;
    assert_eq!(rx.try_recv(), Ok(true));
    assert_eq!(h.probe.checks(), 3);
}

#[tokio::test]
async fn test_begin_external_gives_up() {
    let mut config = common::test_config(Slot::Kodi, AttachPolicy::Always);
    config.external.poll_timeout_ms = 40;
    let mut h = Harness::with(config, MockHost::ready(), MockFactory::default());
    *h.probe.remaining_busy.lock().unwrap() = usize::MAX;
    h.controller.start().await;

    let (tx, mut rx) = oneshot::channel();
    h.controller.begin_external(tx).await;
    let freed = loop {
        if let Ok(freed) = rx.try_recv() {
            break freed;
        }
        h.pump().await;
    };
    assert!(!freed);
    assert!(h.probe.checks() >= 2);
    // Still in external mode; only end_external leaves it
    assert!(h.controller.is_external());
}

#[tokio::test]
async fn test_end_external_answers_pending_wait() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;
    *h.probe.remaining_busy.lock().unwrap() = usize::MAX;

    let (tx, rx) = oneshot::channel();
    h.controller.begin_external(tx).await;
    h.controller.end_external().await;

    assert!(!rx.await.unwrap());
    assert!(!h.controller.is_external());
}

#[tokio::test]
async fn test_host_stop_clears_vdr_once() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    let mut watcher = HostStatusWatcher::new(true);

    let signal = watcher.observe(RawHostEvent::Stop);
    assert_eq!(signal, Some(HostSignal::HostStopped));
    h.controller.on_host_stop();
    assert_eq!(h.controller.current(), None);
    assert!(!h.controller.host_ready());
    assert_eq!(h.controller.status().await, AttachState::Detached);

    // Losing the bus name afterwards raises nothing new
    assert_eq!(watcher.observe(RawHostEvent::NameLost), None);
    h.controller.on_host_stop();
    assert_eq!(h.controller.current(), None);
}

#[tokio::test]
async fn test_host_stop_leaves_kodi_alone() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;

    h.controller.on_host_stop();
    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert!(h.kodi.lock().unwrap().attached);
}

#[tokio::test]
async fn test_host_ready_while_kodi_rebuilds_vdr_only() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;
    let kodi_attaches = h.kodi.lock().unwrap().attaches;

    h.controller.handle(vdr_frontend::event::Event::Host(HostSignal::HostReady)).await;

    assert_eq!(h.controller.current(), Some(Slot::Kodi));
    assert_eq!(h.vdr.lock().unwrap().detaches, 1);
    // Startup re-attaches the running application, which is idempotent
    assert_eq!(h.kodi.lock().unwrap().attaches, kodi_attaches + 1);
    assert_eq!(h.kodi.lock().unwrap().detaches, 0);
}

#[tokio::test]
async fn test_send_shutdown_presses_power_with_remote_restored() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    h.host.state.lock().unwrap().remote_enabled = false;
    h.host.state.lock().unwrap().remote_changes.clear();

    assert!(h.controller.send_shutdown(true).await);
    assert_eq!(h.host.keys(), vec!["POWER".to_string()]);
    assert_eq!(h.host.state.lock().unwrap().remote_changes, vec![true, false]);
}

#[tokio::test]
async fn test_send_shutdown_refused() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;

    h.host.state.lock().unwrap().confirm = Answer::No;
    assert!(!h.controller.send_shutdown(false).await);

    h.host.state.lock().unwrap().confirm = Answer::Yes;
    *h.veto.answer.lock().unwrap() = Answer::No;
    assert!(!h.controller.send_shutdown(false).await);

    assert!(h.host.keys().is_empty());
}

#[tokio::test]
async fn test_send_shutdown_proceeds_when_veto_service_is_unreachable() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    *h.veto.answer.lock().unwrap() = Answer::Fail;

    assert!(h.controller.send_shutdown(true).await);
    assert_eq!(h.host.keys(), vec!["POWER".to_string()]);
}

#[tokio::test]
async fn test_send_shutdown_held_back_when_host_does_not_answer() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;
    h.host.state.lock().unwrap().confirm = Answer::Fail;

    assert!(!h.controller.send_shutdown(true).await);
    assert!(h.host.keys().is_empty());

    // The veto service is never consulted without host approval
    *h.veto.answer.lock().unwrap() = Answer::Fail;
    assert!(!h.controller.send_shutdown(false).await);
    assert!(h.host.keys().is_empty());
}

#[tokio::test]
async fn test_init_shutdown_keeps_frontend_that_survives_power_key() {
    let mut h = started(Slot::Kodi, AttachPolicy::Always).await;

    assert!(h.controller.init_shutdown().await);
    assert_eq!(h.kodi.lock().unwrap().detaches, 0);
    assert_eq!(h.host.keys(), vec!["POWER".to_string()]);
}

#[tokio::test]
async fn test_soft_detach_fires_deferred_shutdown() {
    let mut config = common::test_config(Slot::Vdr, AttachPolicy::Always);
    config.frontend.shutdown_delay_ms = 20;
    let mut h = Harness::with(config, MockHost::ready(), MockFactory::default());
    h.controller.start().await;

    assert!(h.controller.soft_detach().await);
    assert!(!h.vdr.lock().unwrap().attached);
    assert!(h.host.keys().is_empty());

    h.pump().await;
    assert_eq!(h.host.keys(), vec!["POWER".to_string()]);
}

#[tokio::test]
async fn test_attach_cancels_deferred_shutdown() {
    let mut config = common::test_config(Slot::Vdr, AttachPolicy::Always);
    config.frontend.shutdown_delay_ms = 20;
    let mut h = Harness::with(config, MockHost::ready(), MockFactory::default());
    h.controller.start().await;

    h.controller.soft_detach().await;
    assert!(h.controller.attach(None).await);

    let fired = tokio::time::timeout(Duration::from_millis(100), h.events.recv()).await;
    assert!(fired.is_err(), "cancelled shutdown timer fired");
    assert!(h.host.keys().is_empty());
}

#[tokio::test]
async fn test_soft_detach_with_never_policy_keeps_frontend() {
    let mut config = common::test_config(Slot::Vdr, AttachPolicy::Never);
    config.frontend.shutdown_delay_ms = 60_000;
    let mut h = Harness::with(config, MockHost::ready(), MockFactory::default());
    h.controller.start().await;
    h.controller.resume().await;

    h.controller.soft_detach().await;
    assert_eq!(h.vdr.lock().unwrap().detaches, 0);
}

#[tokio::test]
async fn test_toggle() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;

    assert!(h.controller.toggle().await);
    assert!(!h.vdr.lock().unwrap().attached);

    assert!(h.controller.toggle().await);
    assert!(h.vdr.lock().unwrap().attached);
}

#[tokio::test]
async fn test_display_handling() {
    let mut h = started(Slot::Vdr, AttachPolicy::Always).await;

    assert!(!h.controller.set_display(None));
    assert!(!h.controller.set_display(Some(String::new())));
    assert_eq!(h.controller.get_display(), ":0");

    assert!(h.controller.set_display(Some(":1".to_string())));
    assert_eq!(h.controller.get_display(), ":1");
    assert_eq!(h.controller.display().get(), ":1");

    assert_eq!(h.controller.temp_display().await, ":0");
    assert_eq!(h.controller.get_display(), ":0");
}
