//! Redundant global keyboard capture.
//!
//! Two independent interception handles share one event callback. The second
//! is installed slightly after the first and starts disabled, as a warm
//! standby. A background timer health-checks both handles; the same check
//! also runs defensively before each dispatch. When the active handle is
//! revoked by the OS the standby is enabled on the spot (a local, lock-free
//! switch), and re-installation of the dead handle runs strictly on the
//! timer thread, never on the event path.
//!
//! All transitions are counted in [`CaptureStats`] for diagnostics. A total
//! loss of both handles leaves capture silently inert until a timer tick
//! revives one.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{KeychordError, Result};
use crate::event::RawKeyEvent;
use crate::logging;

#[cfg(target_os = "macos")]
pub mod tap;

/// Invoked for every captured key event. Must not block: no disk, no locks
/// that a syscall-holding thread could own.
pub type EventCallback = Arc<dyn Fn(RawKeyEvent) + Send + Sync>;

/// One OS-level interception handle. Implementations must keep `is_enabled`
/// cheap enough for the event path.
pub trait CaptureHandle: Send + Sync {
    fn enable(&self) -> Result<()>;
    fn disable(&self);
    fn is_enabled(&self) -> bool;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureState {
    Uninitialized = 0,
    PrimaryActive = 1,
    FailedOver = 2,
    BothDown = 3,
    Recovering = 4,
}

impl CaptureState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CaptureState::PrimaryActive,
            2 => CaptureState::FailedOver,
            3 => CaptureState::BothDown,
            4 => CaptureState::Recovering,
            _ => CaptureState::Uninitialized,
        }
    }
}

/// Monotonic transition counters, readable from any thread.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub failovers: AtomicU64,
    pub recovery_attempts: AtomicU64,
    pub recovery_successes: AtomicU64,
    pub health_checks: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub failovers: u64,
    pub recovery_attempts: u64,
    pub recovery_successes: u64,
    pub health_checks: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            failovers: self.failovers.load(Ordering::Relaxed),
            recovery_attempts: self.recovery_attempts.load(Ordering::Relaxed),
            recovery_successes: self.recovery_successes.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
        }
    }
}

const PRIMARY: usize = 0;
const SECONDARY: usize = 1;

pub struct DualCapture {
    handles: [Arc<dyn CaptureHandle>; 2],
    active: AtomicUsize,
    state: AtomicU8,
    /// Set when a failover leaves a dead handle behind; cleared by the timer
    /// thread once recovery runs.
    recovery_pending: AtomicBool,
    /// The inactive handle verified healthy by a recovery attempt. Standby
    /// handles are parked disabled, so liveness has to be remembered here.
    standby_healthy: AtomicBool,
    stats: CaptureStats,
    recovery_max_attempts: u32,
    recovery_base_delay: Duration,
}

impl DualCapture {
    /// Install both handles. Succeeds if at least one enables; the secondary
    /// starts disabled as a standby.
    pub fn new(
        primary: Arc<dyn CaptureHandle>,
        secondary: Arc<dyn CaptureHandle>,
        recovery_max_attempts: u32,
        recovery_base_delay: Duration,
    ) -> Result<Self> {
        let capture = DualCapture {
            handles: [primary, secondary],
            active: AtomicUsize::new(PRIMARY),
            state: AtomicU8::new(CaptureState::Uninitialized as u8),
            recovery_pending: AtomicBool::new(false),
            standby_healthy: AtomicBool::new(false),
            stats: CaptureStats::default(),
            recovery_max_attempts,
            recovery_base_delay,
        };

        match capture.handles[PRIMARY].enable() {
            Ok(()) => {
                capture.handles[SECONDARY].disable();
                capture.set_state(CaptureState::PrimaryActive);
                info!(handle = capture.handles[PRIMARY].label(), "Capture installed");
            }
            Err(e) => {
                warn!(error = %e, "Primary capture handle failed to install, trying standby");
                capture.handles[SECONDARY].enable().map_err(|e2| {
                    KeychordError::Capture(format!(
                        "both capture handles failed to install: {e}; {e2}"
                    ))
                })?;
                capture.active.store(SECONDARY, Ordering::Release);
                capture.set_state(CaptureState::FailedOver);
                capture.recovery_pending.store(true, Ordering::Release);
            }
        }
        Ok(capture)
    }

    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CaptureState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// The handle last known to be delivering events. Two atomic loads, no
    /// probing: liveness is the health machinery's job. `None` while both
    /// handles are known down.
    pub fn active_handle(&self) -> Option<&Arc<dyn CaptureHandle>> {
        match self.state() {
            CaptureState::Uninitialized | CaptureState::BothDown => None,
            _ => Some(&self.handles[self.active.load(Ordering::Acquire)]),
        }
    }

    /// Compare last-known health against live health and switch if the
    /// active handle died. Safe to call from the dispatch path: the only
    /// syscall-free work here is an atomic read plus, on the rare failover,
    /// a local re-enable of the warm standby. Returns whether capture is
    /// currently usable.
    pub fn check_and_failover(&self) -> bool {
        self.stats.health_checks.fetch_add(1, Ordering::Relaxed);
        let active = self.active.load(Ordering::Acquire);
        if self.handles[active].is_enabled() {
            return true;
        }

        let standby = 1 - active;
        match self.handles[standby].enable() {
            Ok(()) => {
                self.active.store(standby, Ordering::Release);
                self.set_state(CaptureState::FailedOver);
                self.standby_healthy.store(false, Ordering::Release);
                self.recovery_pending.store(true, Ordering::Release);
                self.stats.failovers.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = self.handles[active].label(),
                    to = self.handles[standby].label(),
                    "Capture handle disabled externally, failed over"
                );
                logging::log_capture_event("failover", self.handles[standby].label());
                true
            }
            Err(e) => {
                if self.state() != CaptureState::BothDown {
                    error!(error = %e, "Both capture handles down, capture inert");
                }
                self.set_state(CaptureState::BothDown);
                self.recovery_pending.store(true, Ordering::Release);
                false
            }
        }
    }

    /// One background timer tick: failover check, pending recovery, and the
    /// switch back to the primary once the timer has confirmed it healthy.
    /// Runs only on the monitor thread; may sleep between recovery attempts.
    pub fn health_tick(&self) {
        self.check_and_failover();

        if self.recovery_pending.swap(false, Ordering::AcqRel) {
            self.recover_inactive();
        }

        // Dispatch keeps using the standby after a failover until a recovery
        // pass on this thread has confirmed the primary healthy.
        if self.state() == CaptureState::FailedOver
            && self.active.load(Ordering::Acquire) == SECONDARY
            && self.standby_healthy.load(Ordering::Acquire)
        {
            // Standby goes quiet first; a window with both taps live would
            // deliver every key twice. A momentary gap is the lesser cost.
            self.handles[SECONDARY].disable();
            match self.handles[PRIMARY].enable() {
                Ok(()) => {
                    self.active.store(PRIMARY, Ordering::Release);
                    self.set_state(CaptureState::PrimaryActive);
                    info!("Primary capture handle healthy again, switched back");
                }
                Err(e) => {
                    self.standby_healthy.store(false, Ordering::Release);
                    self.recovery_pending.store(true, Ordering::Release);
                    if self.handles[SECONDARY].enable().is_err() {
                        error!(error = %e, "Switch-back failed and standby would not re-enable");
                        self.set_state(CaptureState::BothDown);
                    }
                }
            }
        }
    }

    /// Bounded re-enable attempts for whichever handle is not active, with
    /// increasing delay. Gives up until the next tick after the last attempt.
    fn recover_inactive(&self) {
        let previous = self.state();
        self.set_state(CaptureState::Recovering);
        let target = 1 - self.active.load(Ordering::Acquire);
        let handle = &self.handles[target];

        for attempt in 1..=self.recovery_max_attempts {
            self.stats.recovery_attempts.fetch_add(1, Ordering::Relaxed);
            match handle.enable() {
                Ok(()) => {
                    self.stats.recovery_successes.fetch_add(1, Ordering::Relaxed);
                    info!(handle = handle.label(), attempt, "Capture handle recovered");
                    // Recovered handle stays standby; parked disabled so it
                    // does not double-deliver events.
                    handle.disable();
                    self.standby_healthy.store(true, Ordering::Release);
                    logging::log_capture_event("recovered", handle.label());
                    self.set_state(if previous == CaptureState::BothDown {
                        CaptureState::FailedOver
                    } else {
                        previous
                    });
                    return;
                }
                Err(e) => {
                    debug!(handle = handle.label(), attempt, error = %e, "Recovery attempt failed");
                    if attempt < self.recovery_max_attempts {
                        thread::sleep(self.recovery_base_delay * attempt);
                    }
                }
            }
        }
        warn!(
            handle = handle.label(),
            attempts = self.recovery_max_attempts,
            "Capture recovery exhausted, waiting for next health check"
        );
        self.set_state(previous);
        self.recovery_pending.store(true, Ordering::Release);
    }
}

/// Owns the health-check timer thread. Dropping stops the thread.
pub struct CaptureMonitor {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureMonitor {
    pub fn spawn(capture: Arc<DualCapture>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("capture-health".into())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis() as u64, "Capture health monitor started");
                while !stop_flag.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    capture.health_tick();
                }
            })
            .ok();
        if thread.is_none() {
            warn!("Could not spawn capture health monitor thread");
        }
        CaptureMonitor { stop, thread }
    }
}

impl Drop for CaptureMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// In-process capture backend. The real backend on platforms without a
/// global event tap, and the test double everywhere.
pub struct SimulatedHandle {
    label: &'static str,
    enabled: AtomicBool,
    revoked: AtomicBool,
    callback: EventCallback,
}

impl SimulatedHandle {
    pub fn new(label: &'static str, callback: EventCallback) -> Arc<Self> {
        Arc::new(SimulatedHandle {
            label,
            enabled: AtomicBool::new(false),
            revoked: AtomicBool::new(false),
            callback,
        })
    }

    /// Deliver an event through this handle, as the OS would. Dropped while
    /// disabled.
    pub fn emit(&self, event: RawKeyEvent) {
        if self.is_enabled() {
            (self.callback)(event);
        }
    }

    /// Simulate the OS revoking the handle: disabled now, and re-enable
    /// fails until [`SimulatedHandle::restore`].
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
        self.enabled.store(false, Ordering::Release);
    }

    pub fn restore(&self) {
        self.revoked.store(false, Ordering::Release);
    }
}

impl CaptureHandle for SimulatedHandle {
    fn enable(&self) -> Result<()> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(KeychordError::Capture(format!(
                "{} revoked by the system",
                self.label
            )));
        }
        self.enabled.store(true, Ordering::Release);
        Ok(())
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn label(&self) -> &'static str {
        self.label
    }
}

/// Install the platform backend pair and wire the shared callback.
pub fn create_dual_capture(
    callback: EventCallback,
    recovery_max_attempts: u32,
    recovery_base_delay: Duration,
) -> Result<Arc<DualCapture>> {
    #[cfg(target_os = "macos")]
    {
        let primary = tap::EventTapHandle::install("event-tap-primary", Arc::clone(&callback))?;
        let secondary = tap::EventTapHandle::install("event-tap-standby", callback)?;
        Ok(Arc::new(DualCapture::new(
            primary,
            secondary,
            recovery_max_attempts,
            recovery_base_delay,
        )?))
    }
    #[cfg(not(target_os = "macos"))]
    {
        let primary = SimulatedHandle::new("sim-primary", Arc::clone(&callback));
        let secondary = SimulatedHandle::new("sim-standby", callback);
        Ok(Arc::new(DualCapture::new(
            primary,
            secondary,
            recovery_max_attempts,
            recovery_base_delay,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callback() -> EventCallback {
        Arc::new(|_| {})
    }

    fn pair() -> (Arc<SimulatedHandle>, Arc<SimulatedHandle>) {
        (
            SimulatedHandle::new("primary", noop_callback()),
            SimulatedHandle::new("standby", noop_callback()),
        )
    }

    fn dual(
        primary: Arc<SimulatedHandle>,
        secondary: Arc<SimulatedHandle>,
    ) -> DualCapture {
        DualCapture::new(primary, secondary, 3, Duration::from_millis(1)).expect("install")
    }

    #[test]
    fn install_enables_primary_and_parks_standby() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));
        assert_eq!(capture.state(), CaptureState::PrimaryActive);
        assert!(primary.is_enabled());
        assert!(!secondary.is_enabled());
        assert_eq!(
            capture.active_handle().map(|h| h.label()),
            Some("primary")
        );
    }

    #[test]
    fn install_survives_dead_primary() {
        let (primary, secondary) = pair();
        primary.revoke();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));
        assert_eq!(capture.state(), CaptureState::FailedOver);
        assert!(secondary.is_enabled());
    }

    #[test]
    fn install_fails_only_when_both_are_dead() {
        let (primary, secondary) = pair();
        primary.revoke();
        secondary.revoke();
        let result = DualCapture::new(primary, secondary, 3, Duration::from_millis(1));
        assert!(result.is_err());
    }

    #[test]
    fn revoked_active_handle_fails_over_on_check() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));

        primary.revoke();
        assert!(capture.check_and_failover());
        assert_eq!(capture.state(), CaptureState::FailedOver);
        assert_eq!(
            capture.active_handle().map(|h| h.label()),
            Some("standby")
        );
        assert_eq!(capture.stats().snapshot().failovers, 1);
    }

    #[test]
    fn active_handle_reports_last_known_health_without_probing() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));

        primary.revoke();
        // No probe: until a health check runs, the last-known active handle
        // is still the primary.
        assert_eq!(
            capture.active_handle().map(|h| h.label()),
            Some("primary")
        );
        capture.check_and_failover();
        // Once the health machinery knows, the dead handle is never handed
        // out again.
        assert_eq!(
            capture.active_handle().map(|h| h.label()),
            Some("standby")
        );
        assert!(capture
            .active_handle()
            .is_some_and(|h| h.is_enabled()));
    }

    #[test]
    fn both_down_is_inert_not_fatal() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));

        primary.revoke();
        secondary.revoke();
        assert!(!capture.check_and_failover());
        assert_eq!(capture.state(), CaptureState::BothDown);
        assert!(capture.active_handle().is_none());
    }

    #[test]
    fn tick_recovers_the_failed_handle_as_standby() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));

        primary.revoke();
        capture.check_and_failover();
        primary.restore();
        capture.health_tick();

        // The tick recovers the primary into standby and, once confirmed
        // healthy, switches back to it.
        assert_eq!(capture.stats().snapshot().recovery_successes, 1);
        capture.health_tick();
        assert_eq!(capture.state(), CaptureState::PrimaryActive);
        assert_eq!(
            capture.active_handle().map(|h| h.label()),
            Some("primary")
        );
    }

    #[test]
    fn exhausted_recovery_waits_for_next_tick() {
        let (primary, secondary) = pair();
        let capture = dual(Arc::clone(&primary), Arc::clone(&secondary));

        primary.revoke();
        capture.check_and_failover();
        capture.health_tick();
        assert_eq!(capture.stats().snapshot().recovery_attempts, 3);
        assert_eq!(capture.stats().snapshot().recovery_successes, 0);
        assert_eq!(capture.state(), CaptureState::FailedOver);

        primary.restore();
        capture.health_tick();
        assert_eq!(capture.stats().snapshot().recovery_successes, 1);
    }

    struct SequencedHandle {
        label: &'static str,
        enabled: AtomicBool,
        revoked: AtomicBool,
        calls: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl SequencedHandle {
        fn new(
            label: &'static str,
            calls: &Arc<parking_lot::Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(SequencedHandle {
                label,
                enabled: AtomicBool::new(false),
                revoked: AtomicBool::new(false),
                calls: Arc::clone(calls),
            })
        }
    }

    impl CaptureHandle for SequencedHandle {
        fn enable(&self) -> Result<()> {
            if self.revoked.load(Ordering::Acquire) {
                return Err(KeychordError::Capture(format!("{} revoked", self.label)));
            }
            self.enabled.store(true, Ordering::Release);
            self.calls.lock().push(format!("{}:enable", self.label));
            Ok(())
        }

        fn disable(&self) {
            self.enabled.store(false, Ordering::Release);
            self.calls.lock().push(format!("{}:disable", self.label));
        }

        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::Acquire)
        }

        fn label(&self) -> &'static str {
            self.label
        }
    }

    #[test]
    fn switch_back_disables_standby_before_enabling_primary() {
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let primary = SequencedHandle::new("primary", &calls);
        let secondary = SequencedHandle::new("secondary", &calls);
        let capture = DualCapture::new(
            Arc::clone(&primary) as Arc<dyn CaptureHandle>,
            Arc::clone(&secondary) as Arc<dyn CaptureHandle>,
            3,
            Duration::from_millis(1),
        )
        .expect("install");

        primary.revoked.store(true, Ordering::Release);
        primary.enabled.store(false, Ordering::Release);
        capture.check_and_failover();
        primary.revoked.store(false, Ordering::Release);
        capture.health_tick();
        assert_eq!(capture.state(), CaptureState::PrimaryActive);

        // The switch-back must never leave both taps live at once: the
        // standby goes quiet before the primary comes back.
        let recorded = calls.lock().clone();
        assert_eq!(
            recorded[recorded.len() - 2..],
            ["secondary:disable".to_string(), "primary:enable".to_string()]
        );
    }

    #[test]
    fn monitor_thread_performs_failover_within_an_interval() {
        let (primary, secondary) = pair();
        let capture = Arc::new(dual(Arc::clone(&primary), Arc::clone(&secondary)));
        let _monitor = CaptureMonitor::spawn(Arc::clone(&capture), Duration::from_millis(5));

        primary.revoke();
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while std::time::Instant::now() < deadline {
            if capture.active_handle().map(|h| h.label()) == Some("standby") {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("monitor did not fail over in time");
    }

    #[test]
    fn disabled_simulated_handle_drops_events() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_cb = Arc::clone(&seen);
        let handle = SimulatedHandle::new(
            "sim",
            Arc::new(move |_| {
                seen_in_cb.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let event = RawKeyEvent::down(0x00, Some('a'), crate::event::Modifiers::empty());
        handle.emit(event.clone());
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        handle.enable().expect("enable");
        handle.emit(event);
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
