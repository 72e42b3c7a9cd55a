//! Timers for the engine's serial execution context.
//!
//! Nothing here spawns threads or sleeps. The engine asks the queue for due
//! timers whenever it runs, so every fire happens on the engine's own thread.

use log::trace;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

// =============================================================================
// Clocks
// =============================================================================

/// Source of the current time for the timer queue.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can advance a clock the engine owns.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Timer Queue
// =============================================================================

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// The recurring reassertion of the current tables.
    Reapply,
    /// The one-shot reapplication after a display reconfiguration settles.
    SettleReapply,
}

#[derive(Debug)]
struct Timer {
    id: TimerId,
    deadline: Instant,
    period: Option<Duration>,
    task: TimerTask,
}

/// Pending timers, ordered by deadline when they come due.
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        deadline: Instant,
        period: Option<Duration>,
        task: TimerTask,
    ) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(Timer {
            id,
            deadline,
            period,
            task,
        });
        id
    }

    /// Start a timer that first fires one `interval` after `now`, then every `interval`.
    pub fn start_recurring(&mut self, now: Instant, interval: Duration, task: TimerTask) -> TimerId {
        let id = self.insert(now + interval, Some(interval), task);
        trace!("recurring timer {:?} started ({:?})", id, interval);
        id
    }

    /// Schedule a timer that fires once, `delay` after `now`.
    pub fn schedule_once(&mut self, now: Instant, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.insert(now + delay, None, task);
        trace!("one-shot timer {:?} scheduled in {:?}", id, delay);
        id
    }

    /// Cancel a timer. Returns false if it was not pending.
    ///
    /// A cancelled timer never fires again.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        before != self.timers.len()
    }

    /// Whether a timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|timer| timer.id == id)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True when nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|timer| timer.deadline).min()
    }

    /// Collect every timer due at `now`, earliest first.
    ///
    /// One-shot timers are removed. Recurring timers fire once even if several
    /// periods were missed, and move to their next deadline after `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TimerId, TimerTask)> {
        let mut due: Vec<(Instant, TimerId, TimerTask)> = self
            .timers
            .iter()
            .filter(|timer| timer.deadline <= now)
            .map(|timer| (timer.deadline, timer.id, timer.task))
            .collect();
        due.sort_by_key(|&(deadline, id, _)| (deadline, id));

        self.timers
            .retain(|timer| timer.deadline > now || timer.period.is_some());
        for timer in self.timers.iter_mut() {
            if let Some(period) = timer.period {
                while timer.deadline <= now {
                    timer.deadline += period;
                }
            }
        }

        due.into_iter().map(|(_, id, task)| (id, task)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_survives_poisoned_lock() {
        let clock = ManualClock::new();
        let start = clock.now();

        let shared = clock.clone();
        let result = std::thread::spawn(move || {
            let _guard = shared.now.lock().unwrap();
            panic!("poison the clock");
        })
        .join();
        assert!(result.is_err());
        assert!(clock.now.is_poisoned());

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), start + Duration::from_millis(250));
    }

    #[test]
    fn test_recurring_fires_every_interval() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.start_recurring(start, Duration::from_secs(1), TimerTask::Reapply);

        assert!(queue.pop_due(start).is_empty());
        assert!(queue.pop_due(start + Duration::from_millis(999)).is_empty());
        assert_eq!(
            queue.pop_due(start + Duration::from_secs(1)),
            vec![(id, TimerTask::Reapply)]
        );
        assert!(queue.pop_due(start + Duration::from_millis(1500)).is_empty());
        assert_eq!(queue.pop_due(start + Duration::from_secs(2)).len(), 1);
        assert!(queue.is_pending(id));
    }

    #[test]
    fn test_missed_periods_coalesce() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        queue.start_recurring(start, Duration::from_secs(1), TimerTask::Reapply);

        assert_eq!(queue.pop_due(start + Duration::from_millis(5500)).len(), 1);
        assert_eq!(
            queue.next_deadline(),
            Some(start + Duration::from_secs(6))
        );
    }

    #[test]
    fn test_one_shot_fires_once() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.schedule_once(start, Duration::from_millis(300), TimerTask::SettleReapply);

        assert!(queue.pop_due(start + Duration::from_millis(299)).is_empty());
        assert_eq!(
            queue.pop_due(start + Duration::from_millis(300)),
            vec![(id, TimerTask::SettleReapply)]
        );
        assert!(queue.pop_due(start + Duration::from_secs(10)).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_prevents_fires() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.start_recurring(start, Duration::from_secs(1), TimerTask::Reapply);

        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(queue.pop_due(start + Duration::from_secs(5)).is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_due_timers_are_ordered() {
        let start = Instant::now();
        let mut queue = TimerQueue::new();
        let recurring = queue.start_recurring(start, Duration::from_secs(1), TimerTask::Reapply);
        let once = queue.schedule_once(start, Duration::from_millis(300), TimerTask::SettleReapply);

        let due = queue.pop_due(start + Duration::from_secs(1));
        assert_eq!(
            due,
            vec![
                (once, TimerTask::SettleReapply),
                (recurring, TimerTask::Reapply)
            ]
        );
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let before = clock.now();

        other.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - before, Duration::from_millis(250));
    }
}
