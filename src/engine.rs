//! The gamma engine: activation state and everything that keeps it applied.

use crate::config::EngineConfig;
use crate::display::{DisplayBackend, ReconfigurationEvent, ReconfigurationPhase};
use crate::handle::{Command, EngineEvent, EngineHandle, HandleLink, SharedState, write_shared};
use crate::listener::ReconfigurationListener;
use crate::scheduler::{Clock, SystemClock, TimerId, TimerQueue, TimerTask};
use crate::sink;
use crate::state::EngineState;
use crate::tables::GammaTables;

use log::{debug, info, trace, warn};
use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Whether the event loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing.
    Continue,
    /// A shutdown was requested; the engine has already deactivated.
    Shutdown,
    /// Every [`EngineHandle`] is gone, so no shutdown can arrive.
    Detached,
}

/// Owns the darkroom transform and keeps it applied to every display.
///
/// All work happens on the thread that owns the engine: direct calls, timer
/// fires and queued events are processed one at a time, so every callback sees
/// a stable activation flag. Other threads reach the engine through an
/// [`EngineHandle`].
///
/// Dropping an active engine deactivates it, restoring the displays.
///
/// # Example
///
/// ```
/// use redscreen_core::{EngineConfig, GammaEngine, MockDisplays};
///
/// let mock = MockDisplays::with_displays(&[1, 2]);
/// let mut engine = GammaEngine::new(mock.clone(), EngineConfig::default());
///
/// engine.toggle();
/// assert!(engine.is_active());
/// assert_eq!(mock.push_count(), 2);
///
/// engine.toggle();
/// assert!(!engine.is_active());
/// assert_eq!(mock.restore_count(), 1);
/// ```
pub struct GammaEngine<B: DisplayBackend, C: Clock = SystemClock> {
    backend: B,
    clock: C,
    config: EngineConfig,
    tables: GammaTables,
    active: bool,
    timers: TimerQueue,
    reapply_timer: Option<TimerId>,
    listener: Option<ReconfigurationListener>,
    incomplete_warned: bool,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    handles: RefCell<Weak<HandleLink>>,
    state: EngineState,
    shared: SharedState,
}

impl<B: DisplayBackend> GammaEngine<B, SystemClock> {
    /// Create an inactive engine driven by the system clock.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_clock(backend, config, SystemClock)
    }
}

impl<B: DisplayBackend, C: Clock> GammaEngine<B, C> {
    /// Create an inactive engine with a custom clock.
    pub fn with_clock(backend: B, config: EngineConfig, clock: C) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            clock,
            config,
            tables: GammaTables::darkroom(),
            active: false,
            timers: TimerQueue::new(),
            reapply_timer: None,
            listener: None,
            incomplete_warned: false,
            events_tx,
            events_rx,
            handles: RefCell::new(Weak::new()),
            state: EngineState::default(),
            shared: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    /// Whether darkroom mode is on.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// A handle for driving this engine from other threads.
    ///
    /// All handles share one link to the engine. Once the last is dropped,
    /// [`run`](Self::run) deactivates and returns.
    pub fn handle(&self) -> EngineHandle {
        let mut handles = self.handles.borrow_mut();
        if let Some(link) = handles.upgrade() {
            return EngineHandle { link };
        }

        let link = Arc::new(HandleLink {
            events: self.events_tx.clone(),
            shared: Arc::clone(&self.shared),
        });
        *handles = Arc::downgrade(&link);
        EngineHandle { link }
    }

    fn has_handles(&self) -> bool {
        self.handles.borrow().strong_count() > 0
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Turn darkroom mode on. Does nothing if already active.
    ///
    /// Builds and pushes the tables, starts the reapplication timer and
    /// registers for reconfiguration notifications. Finding no displays is not
    /// an error; they pick up the tables on a later reapplication.
    pub fn activate(&mut self) {
        if self.active {
            trace!("activate: already active");
            return;
        }

        info!("activating darkroom mode");
        self.state = EngineState::default();
        self.incomplete_warned = false;
        self.build_and_apply();
        self.start_timer();
        self.register_listener();
        self.active = true;
        self.publish();
    }

    /// Turn darkroom mode off and restore the displays. Does nothing if inactive.
    ///
    /// The timer and listener go first so nothing re-applies tables once
    /// restoration has begun.
    pub fn deactivate(&mut self) {
        if !self.active {
            trace!("deactivate: already inactive");
            return;
        }

        info!("deactivating darkroom mode");
        self.stop_timer();
        self.unregister_listener();
        sink::restore_displays(&self.backend);
        self.active = false;
        self.state.last_apply = None;
        self.publish();
    }

    /// Flip darkroom mode. Returns the new activation state.
    pub fn toggle(&mut self) -> bool {
        if self.active {
            self.deactivate();
        } else {
            self.activate();
        }
        self.active
    }

    /// Rebuild and re-push the tables if active; otherwise do nothing.
    pub fn reapply(&mut self) {
        if !self.active {
            trace!("reapply skipped: inactive");
            return;
        }
        self.build_and_apply();
        self.publish();
    }

    /// React to a display reconfiguration notification.
    ///
    /// The end of a reconfiguration schedules one reapplication after the
    /// settle delay. That reapplication re-checks the activation flag when it
    /// fires, so it is never cancelled.
    pub fn handle_reconfiguration(&mut self, event: ReconfigurationEvent) {
        if event.phase == ReconfigurationPhase::Begin {
            return;
        }

        let now = self.clock.now();
        let id = self
            .timers
            .schedule_once(now, self.config.settle_delay, TimerTask::SettleReapply);
        debug!(
            "display {} reconfigured, reapplying in {:?} ({:?})",
            event.display, self.config.settle_delay, id
        );
    }

    fn build_and_apply(&mut self) {
        self.tables = GammaTables::darkroom();
        let report = sink::apply_to_displays(&self.backend, &self.tables);
        if !report.is_complete() {
            if self.incomplete_warned {
                debug!(
                    "tables applied to {} of {} displays",
                    report.applied, report.found
                );
            } else {
                warn!(
                    "only {} of {} displays accepted the darkroom tables",
                    report.applied, report.found
                );
                self.incomplete_warned = true;
            }
        }
        self.state.last_apply = Some(report);
        self.state.apply_passes += 1;
    }

    fn start_timer(&mut self) {
        let now = self.clock.now();
        let id = self
            .timers
            .start_recurring(now, self.config.reapply_interval, TimerTask::Reapply);
        self.reapply_timer = Some(id);
    }

    fn stop_timer(&mut self) {
        if let Some(id) = self.reapply_timer.take() {
            self.timers.cancel(id);
            debug!("reapplication timer stopped ({:?})", id);
        }
    }

    fn register_listener(&mut self) {
        match ReconfigurationListener::register(&self.backend, self.events_tx.clone()) {
            Ok(listener) => self.listener = Some(listener),
            Err(e) => warn!("reconfiguration notifications unavailable: {}", e),
        }
    }

    fn unregister_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.unregister(&self.backend) {
                warn!("failed to remove reconfiguration listener: {}", e);
            }
        }
    }

    fn publish(&mut self) {
        self.state.is_active = self.active;
        write_shared(&self.shared, self.state);
    }

    // =========================================================================
    // Serial execution context
    // =========================================================================

    /// The earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run one queued event.
    pub fn handle_event(&mut self, event: EngineEvent) -> Flow {
        match event {
            EngineEvent::Command(Command::Activate) => self.activate(),
            EngineEvent::Command(Command::Deactivate) => self.deactivate(),
            EngineEvent::Command(Command::Toggle) => {
                self.toggle();
            }
            EngineEvent::Command(Command::Reapply) => self.reapply(),
            EngineEvent::Command(Command::Shutdown) => {
                self.deactivate();
                return Flow::Shutdown;
            }
            EngineEvent::Reconfigured(event) => self.handle_reconfiguration(event),
            EngineEvent::Detached => {
                // A new handle may have been taken since this was queued.
                if !self.has_handles() {
                    debug!("all engine handles dropped");
                    return Flow::Detached;
                }
            }
        }
        Flow::Continue
    }

    /// Fire every timer that is due. Returns how many fired.
    pub fn fire_due_timers(&mut self) -> usize {
        let due = self.timers.pop_due(self.clock.now());
        for &(id, task) in &due {
            trace!("timer {:?} fired: {:?}", id, task);
            self.reapply();
        }
        due.len()
    }

    /// Drain queued events, then fire due timers, without blocking.
    pub fn process_pending(&mut self) -> Flow {
        while let Ok(event) = self.events_rx.try_recv() {
            let flow = self.handle_event(event);
            if flow != Flow::Continue {
                return flow;
            }
        }
        self.fire_due_timers();
        Flow::Continue
    }

    fn idle_timeout(&self) -> Option<Duration> {
        let now = self.clock.now();
        let until_timer = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now));
        let pump = (self.listener.is_some() && self.backend.needs_event_pump())
            .then_some(self.config.event_poll_interval);

        match (until_timer, pump) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process events and timers on this thread until shutdown is requested
    /// or no [`EngineHandle`] remains.
    ///
    /// The engine is always inactive when this returns.
    pub fn run(&mut self) {
        info!("engine running");
        loop {
            self.backend.dispatch_pending();
            if self.process_pending() != Flow::Continue || !self.has_handles() {
                break;
            }

            // The engine holds a sender, so the queue never disconnects.
            let next = match self.idle_timeout() {
                Some(timeout) => self.events_rx.recv_timeout(timeout).ok(),
                None => self.events_rx.recv().ok(),
            };

            if let Some(event) = next {
                if self.handle_event(event) != Flow::Continue {
                    break;
                }
            }
        }
        self.deactivate();
        info!("engine stopped");
    }
}

impl<B: DisplayBackend, C: Clock> Drop for GammaEngine<B, C> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayId;
    use crate::mock::MockDisplays;
    use crate::scheduler::ManualClock;

    fn engine_with(mock: &MockDisplays) -> (GammaEngine<MockDisplays, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let engine = GammaEngine::with_clock(mock.clone(), EngineConfig::default(), clock.clone());
        (engine, clock)
    }

    #[test]
    fn test_starts_inactive() {
        let mock = MockDisplays::with_displays(&[1]);
        let (engine, _) = engine_with(&mock);

        assert!(!engine.is_active());
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(mock.push_count(), 0);
    }

    #[test]
    fn test_activate_applies_and_registers() {
        let mock = MockDisplays::with_displays(&[1, 2]);
        let (mut engine, _) = engine_with(&mock);

        engine.activate();

        assert!(engine.is_active());
        assert_eq!(mock.push_count(), 2);
        assert_eq!(mock.active_listeners(), 1);
        assert!(engine.next_deadline().is_some());
        assert_eq!(
            engine.state().last_apply.map(|r| (r.found, r.applied)),
            Some((2, 2))
        );
    }

    #[test]
    fn test_activate_twice_is_idempotent() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        engine.activate();
        engine.activate();

        assert_eq!(mock.push_count(), 1);
        assert_eq!(mock.registration_count(), 1);
        assert_eq!(engine.timers.len(), 1);
    }

    #[test]
    fn test_deactivate_when_inactive_does_nothing() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        engine.deactivate();

        assert!(!engine.is_active());
        assert_eq!(mock.restore_count(), 0);
    }

    #[test]
    fn test_deactivate_restores_once() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        engine.activate();
        engine.deactivate();
        engine.deactivate();

        assert!(!engine.is_active());
        assert_eq!(mock.restore_count(), 1);
        assert_eq!(mock.active_listeners(), 0);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_toggle_twice_round_trips() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        assert!(engine.toggle());
        assert!(!engine.toggle());

        assert_eq!(mock.push_count(), 1);
        assert_eq!(mock.restore_count(), 1);
        assert_eq!(mock.registration_count(), 1);
        assert_eq!(mock.active_listeners(), 0);
    }

    #[test]
    fn test_reapply_while_inactive_is_noop() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        engine.reapply();
        assert_eq!(mock.push_count(), 0);
    }

    #[test]
    fn test_timer_reapplies_every_interval() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();

        clock.advance(Duration::from_millis(500));
        assert_eq!(engine.fire_due_timers(), 0);

        clock.advance(Duration::from_millis(500));
        assert_eq!(engine.fire_due_timers(), 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(engine.fire_due_timers(), 1);

        assert_eq!(mock.push_count(), 3);
        assert_eq!(engine.state().apply_passes, 3);
    }

    #[test]
    fn test_no_timer_fires_after_deactivate() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();
        engine.deactivate();

        clock.advance(Duration::from_secs(5));
        assert_eq!(engine.fire_due_timers(), 0);
        assert_eq!(mock.push_count(), 1);
    }

    #[test]
    fn test_reconfiguration_end_reapplies_after_settle_delay() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();

        mock.emit(ReconfigurationEvent::end(DisplayId::new(1)));
        assert_eq!(engine.process_pending(), Flow::Continue);
        assert_eq!(mock.push_count(), 1);

        clock.advance(Duration::from_millis(299));
        engine.process_pending();
        assert_eq!(mock.push_count(), 1);

        clock.advance(Duration::from_millis(1));
        engine.process_pending();
        assert_eq!(mock.push_count(), 2);

        clock.advance(Duration::from_millis(600));
        engine.process_pending();
        assert_eq!(mock.push_count(), 2);

        // Recurring timer at 1s.
        clock.advance(Duration::from_millis(100));
        engine.process_pending();
        assert_eq!(mock.push_count(), 3);
    }

    #[test]
    fn test_reconfiguration_begin_is_ignored() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();

        mock.emit(ReconfigurationEvent::begin(DisplayId::new(1)));
        engine.process_pending();
        clock.advance(Duration::from_millis(300));
        engine.process_pending();

        assert_eq!(mock.push_count(), 1);
    }

    #[test]
    fn test_settle_reapply_after_deactivate_is_noop() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();

        mock.emit(ReconfigurationEvent::end(DisplayId::new(1)));
        engine.process_pending();
        engine.deactivate();

        clock.advance(Duration::from_millis(300));
        assert_eq!(engine.fire_due_timers(), 1);
        assert_eq!(mock.push_count(), 1);
    }

    #[test]
    fn test_activate_without_displays() {
        let mock = MockDisplays::new();
        let (mut engine, clock) = engine_with(&mock);

        engine.activate();
        assert!(engine.is_active());
        assert_eq!(mock.push_count(), 0);

        mock.connect(DisplayId::new(9));
        clock.advance(Duration::from_secs(1));
        engine.process_pending();

        assert_eq!(mock.pushes_for(DisplayId::new(9)), 1);
        assert_eq!(mock.last_tables(), Some(GammaTables::darkroom()));
    }

    #[test]
    fn test_handle_commands_run_in_order() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);
        let handle = engine.handle();

        handle.activate().unwrap();
        handle.reapply().unwrap();
        assert!(!handle.is_active());

        assert_eq!(engine.process_pending(), Flow::Continue);
        assert!(handle.is_active());
        assert_eq!(mock.push_count(), 2);

        handle.toggle().unwrap();
        engine.process_pending();
        assert!(!handle.is_active());
        assert_eq!(mock.restore_count(), 1);
    }

    #[test]
    fn test_shutdown_deactivates() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);
        let handle = engine.handle();
        engine.activate();

        handle.shutdown().unwrap();
        handle.activate().unwrap();
        assert_eq!(engine.process_pending(), Flow::Shutdown);

        assert!(!engine.is_active());
        assert_eq!(mock.restore_count(), 1);
    }

    #[test]
    fn test_run_returns_on_shutdown() {
        let mock = MockDisplays::with_displays(&[1]);
        let mut engine = GammaEngine::new(mock.clone(), EngineConfig::default());
        let handle = engine.handle();

        handle.activate().unwrap();
        handle.shutdown().unwrap();
        engine.run();

        assert!(!engine.is_active());
        assert_eq!(mock.push_count(), 1);
        assert_eq!(mock.restore_count(), 1);
    }

    #[test]
    fn test_drop_restores_active_engine() {
        let mock = MockDisplays::with_displays(&[1]);
        {
            let (mut engine, _) = engine_with(&mock);
            engine.activate();
        }
        assert_eq!(mock.restore_count(), 1);
        assert_eq!(mock.active_listeners(), 0);
    }

    #[test]
    fn test_run_returns_when_handles_dropped() {
        let mock = MockDisplays::with_displays(&[1]);
        let mut engine = GammaEngine::new(mock.clone(), EngineConfig::default());
        let handle = engine.handle();
        let second = handle.clone();
        engine.activate();

        drop(handle);
        drop(second);
        engine.run();

        assert!(!engine.is_active());
        assert_eq!(mock.restore_count(), 1);
        assert_eq!(mock.active_listeners(), 0);
    }

    #[test]
    fn test_run_returns_without_any_handle() {
        let mock = MockDisplays::with_displays(&[1]);
        let mut engine = GammaEngine::new(mock.clone(), EngineConfig::default());
        engine.activate();

        engine.run();

        assert!(!engine.is_active());
        assert_eq!(mock.restore_count(), 1);
    }

    #[test]
    fn test_handle_taken_after_detach_keeps_engine_attached() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);

        drop(engine.handle());
        let handle = engine.handle();

        assert_eq!(engine.process_pending(), Flow::Continue);
        handle.shutdown().unwrap();
        assert_eq!(engine.process_pending(), Flow::Shutdown);
    }

    #[test]
    fn test_last_handle_drop_detaches() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);
        let handle = engine.handle();
        let weak = handle.downgrade();
        assert!(weak.upgrade().is_some());

        drop(handle);

        assert!(weak.upgrade().is_none());
        assert_eq!(engine.process_pending(), Flow::Detached);
    }

    #[test]
    fn test_begin_phase_schedules_nothing() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, _) = engine_with(&mock);
        engine.activate();
        let deadline = engine.next_deadline();

        engine.handle_reconfiguration(ReconfigurationEvent::begin(DisplayId::new(1)));

        assert_eq!(engine.timers.len(), 1);
        assert_eq!(engine.next_deadline(), deadline);

        engine.handle_reconfiguration(ReconfigurationEvent::end(DisplayId::new(1)));
        assert_eq!(engine.timers.len(), 2);
    }

    #[test]
    fn test_idle_timeout_polls_while_listening() {
        let mock = MockDisplays::with_displays(&[1]);
        mock.set_needs_event_pump(true);
        let (mut engine, _) = engine_with(&mock);
        assert_eq!(engine.idle_timeout(), None);

        engine.activate();
        assert_eq!(engine.idle_timeout(), Some(Duration::from_millis(100)));

        engine.deactivate();
        assert_eq!(engine.idle_timeout(), None);
    }

    #[test]
    fn test_idle_timeout_waits_for_timer_without_pump() {
        let mock = MockDisplays::with_displays(&[1]);
        let (mut engine, clock) = engine_with(&mock);
        engine.activate();

        assert_eq!(engine.idle_timeout(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_millis(400));
        assert_eq!(engine.idle_timeout(), Some(Duration::from_millis(600)));
    }

    #[test]
    fn test_idle_timeout_skips_pump_without_listener() {
        let mock = MockDisplays::with_displays(&[1]);
        mock.set_needs_event_pump(true);
        mock.fail_registration(true);
        let (mut engine, _) = engine_with(&mock);
        engine.activate();

        assert_eq!(engine.idle_timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_registration_failure_still_activates() {
        let mock = MockDisplays::with_displays(&[1]);
        mock.fail_registration(true);
        let (mut engine, clock) = engine_with(&mock);

        engine.activate();

        assert!(engine.is_active());
        assert!(engine.listener.is_none());
        assert_eq!(mock.active_listeners(), 0);

        clock.advance(Duration::from_secs(1));
        engine.process_pending();
        assert_eq!(mock.push_count(), 2);

        engine.deactivate();
        assert_eq!(mock.restore_count(), 1);
    }

    #[test]
    fn test_incomplete_apply_warns_once_per_activation() {
        let mock = MockDisplays::with_displays(&[1, 2]);
        let (mut engine, clock) = engine_with(&mock);

        engine.activate();
        assert!(!engine.incomplete_warned);

        mock.reject(DisplayId::new(2));
        clock.advance(Duration::from_secs(1));
        engine.process_pending();
        assert!(engine.incomplete_warned);

        clock.advance(Duration::from_secs(1));
        engine.process_pending();
        assert!(engine.incomplete_warned);

        // A fresh activation starts with a clean slate.
        engine.deactivate();
        mock.disconnect(DisplayId::new(2));
        engine.activate();
        assert!(!engine.incomplete_warned);
        assert!(engine.state().last_apply.unwrap().is_complete());
    }

    #[test]
    fn test_handle_disconnects_when_engine_dropped() {
        let mock = MockDisplays::new();
        let (engine, _) = engine_with(&mock);
        let handle = engine.handle();
        drop(engine);

        assert!(matches!(
            handle.toggle(),
            Err(crate::EngineError::Disconnected)
        ));
    }
}
