//! Hysteretic zone state machine with event-time confirmation timers

use serde::{Deserialize, Serialize};

use crate::model::{Alert, SampleEvent, ZoneStatus};
use crate::window::SlidingWindow;

/// 5-minute average at or above this arms the STRESSED confirmation timer.
pub const T_STRESSED_UP: f64 = 0.75;
/// 1-minute average at or above this arms the CRITICAL confirmation timer.
pub const T_CRITICAL_UP: f64 = 0.90;
/// 5-minute average at or below this drops CRITICAL back to STRESSED.
pub const T_CRITICAL_DOWN: f64 = 0.80;
/// 5-minute average at or below this drops STRESSED back to NORMAL.
pub const T_STRESSED_DOWN: f64 = 0.65;

/// How long the stressed condition must hold before NORMAL -> STRESSED.
pub const CONFIRM_STRESSED_MS: i64 = 60_000;
/// How long the critical condition must hold before STRESSED -> CRITICAL.
pub const CONFIRM_CRITICAL_MS: i64 = 20_000;

/// Minimum event-time gap between two emitted alerts for the same zone.
/// Dedupes repeated transitions at the same or adjacent timestamps under
/// replay; this is data-driven, not a wall-clock rate limit.
pub const ALERT_DEDUP_MS: i64 = 1_000;

/// Seconds covered by the short and long windows.
pub const WINDOW_SHORT_SECS: i64 = 60;
pub const WINDOW_LONG_SECS: i64 = 300;

/// A fired state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ZoneStatus,
    pub to: ZoneStatus,
}

/// The set of transitions the machine can produce.
pub const LEGAL_TRANSITIONS: [(ZoneStatus, ZoneStatus); 4] = [
    (ZoneStatus::Normal, ZoneStatus::Stressed),
    (ZoneStatus::Stressed, ZoneStatus::Critical),
    (ZoneStatus::Critical, ZoneStatus::Stressed),
    (ZoneStatus::Stressed, ZoneStatus::Normal),
];

/// The pure threshold/timer core. Consumes one `(t, avg_1m, avg_5m)`
/// observation per event, in arrival order, and reports at most one fired
/// transition. Identical input sequences produce identical transition
/// sequences.
#[derive(Debug, Clone)]
pub struct StateMachine {
    status: ZoneStatus,
    stressed_since: Option<i64>,
    critical_since: Option<i64>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            status: ZoneStatus::Normal,
            stressed_since: None,
            critical_since: None,
        }
    }

    pub fn status(&self) -> ZoneStatus {
        self.status
    }

    /// Advance the machine by one event. `t` is the event's own timestamp;
    /// comparisons are inclusive on the cited sides (>= up, <= down).
    pub fn advance(&mut self, t: i64, avg_1m: f64, avg_5m: f64) -> Option<Transition> {
        let prev = self.status;

        match self.status {
            ZoneStatus::Normal => {
                if avg_5m >= T_STRESSED_UP {
                    let since = *self.stressed_since.get_or_insert(t);
                    if t - since >= CONFIRM_STRESSED_MS {
                        self.status = ZoneStatus::Stressed;
                        self.stressed_since = None;
                    }
                } else {
                    // Condition broke inside the confirmation window
                    self.stressed_since = None;
                }
            }
            ZoneStatus::Stressed => {
                if avg_1m >= T_CRITICAL_UP {
                    let since = *self.critical_since.get_or_insert(t);
                    if t - since >= CONFIRM_CRITICAL_MS {
                        self.status = ZoneStatus::Critical;
                        self.critical_since = None;
                    }
                } else if avg_5m <= T_STRESSED_DOWN {
                    self.stressed_since = None;
                    self.critical_since = None;
                    self.status = ZoneStatus::Normal;
                } else {
                    self.critical_since = None;
                }
            }
            ZoneStatus::Critical => {
                if avg_5m <= T_CRITICAL_DOWN {
                    self.critical_since = None;
                    // Arm a prompt re-entry path should load rebound
                    self.stressed_since = Some(t);
                    self.status = ZoneStatus::Stressed;
                }
            }
        }

        if self.status == prev {
            return None;
        }

        // The triggering event also runs one timer-arming pass in the new
        // state, so a confirmation clock that is already satisfied starts at
        // this event's timestamp rather than the next one's. Never fires a
        // second transition for the same event.
        self.arm(t, avg_1m, avg_5m);

        Some(Transition { from: prev, to: self.status })
    }

    fn arm(&mut self, t: i64, avg_1m: f64, avg_5m: f64) {
        match self.status {
            ZoneStatus::Normal => {
                if avg_5m >= T_STRESSED_UP && self.stressed_since.is_none() {
                    self.stressed_since = Some(t);
                }
            }
            ZoneStatus::Stressed => {
                if avg_1m >= T_CRITICAL_UP && self.critical_since.is_none() {
                    self.critical_since = Some(t);
                }
            }
            ZoneStatus::Critical => {}
        }
    }
}

/// Everything the processor tracks for one zone: the two windows, the
/// machine, the alert-dedup clock, and the last observed coordinates.
/// Created lazily on the zone's first event; owned by exactly one worker.
#[derive(Debug)]
pub struct ZoneState {
    pub zone_id: String,
    machine: StateMachine,
    window_1m: SlidingWindow,
    window_5m: SlidingWindow,
    last_alert_ts: Option<i64>,
    last_coord: Option<(f64, f64)>,
}

impl ZoneState {
    pub fn new(zone_id: &str) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            machine: StateMachine::new(),
            window_1m: SlidingWindow::new(WINDOW_SHORT_SECS),
            window_5m: SlidingWindow::new(WINDOW_LONG_SECS),
            last_alert_ts: None,
            last_coord: None,
        }
    }

    pub fn status(&self) -> ZoneStatus {
        self.machine.status()
    }

    pub fn averages(&self) -> (f64, f64) {
        (self.window_1m.average(), self.window_5m.average())
    }

    pub fn last_coord(&self) -> Option<(f64, f64)> {
        self.last_coord
    }

    /// Feed one sample through the windows and the machine.
    ///
    /// A fired transition always mutates the in-memory state and is always
    /// reported; the alert is additionally gated by the dedup guard, so a
    /// replayed duplicate transition at the same (or adjacent) event time
    /// produces no second alert.
    pub fn observe(&mut self, event: &SampleEvent) -> Observation {
        let t = event.event_timestamp;
        self.window_1m.add(t, event.load);
        self.window_5m.add(t, event.load);
        self.last_coord = Some((event.latitude, event.longitude));

        let avg_1m = self.window_1m.average();
        let avg_5m = self.window_5m.average();

        let Some(transition) = self.machine.advance(t, avg_1m, avg_5m) else {
            return Observation { transition: None, alert: None };
        };
        assert!(
            LEGAL_TRANSITIONS.contains(&(transition.from, transition.to)),
            "illegal transition {:?} -> {:?} for zone {}",
            transition.from,
            transition.to,
            self.zone_id
        );

        let alert = match self.last_alert_ts {
            Some(last) if t - last <= ALERT_DEDUP_MS => None,
            _ => {
                self.last_alert_ts = Some(t);
                Some(Alert {
                    zone_id: self.zone_id.clone(),
                    previous_state: transition.from,
                    current_state: transition.to,
                    avg_1m,
                    avg_5m,
                    timestamp: t,
                })
            }
        };

        Observation { transition: Some(transition), alert }
    }
}

/// Outcome of feeding one sample to a zone.
#[derive(Debug, Clone)]
pub struct Observation {
    /// The transition that fired on this event, if any.
    pub transition: Option<Transition>,
    /// The alert to emit, unless the dedup guard suppressed it.
    pub alert: Option<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the machine with a constant pair of averages at 1 Hz.
    fn feed(machine: &mut StateMachine, start: i64, secs: i64, a1: f64, a5: f64) -> Vec<(i64, Transition)> {
        let mut fired = Vec::new();
        for i in 0..secs {
            let t = start + i * 1000;
            if let Some(tr) = machine.advance(t, a1, a5) {
                fired.push((t, tr));
            }
        }
        fired
    }

    #[test]
    fn test_stressed_requires_full_confirmation() {
        let mut machine = StateMachine::new();
        let fired = feed(&mut machine, 1_000_000, 61, 0.8, 0.8);
        assert_eq!(fired.len(), 1);
        // Armed at 1_000_000, fires once t - since >= 60_000
        assert_eq!(fired[0].0, 1_060_000);
        assert_eq!(fired[0].1.to, ZoneStatus::Stressed);
    }

    #[test]
    fn test_stressed_up_threshold_inclusive() {
        let mut machine = StateMachine::new();
        let fired = feed(&mut machine, 0, 61, 0.75, 0.75);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1.to, ZoneStatus::Stressed);

        // Just below never arms
        let mut machine = StateMachine::new();
        assert!(feed(&mut machine, 0, 120, 0.7499, 0.7499).is_empty());
    }

    #[test]
    fn test_critical_up_threshold_inclusive() {
        let mut machine = StateMachine::new();
        feed(&mut machine, 0, 61, 0.90, 0.90);
        assert_eq!(machine.status(), ZoneStatus::Stressed);
        // Timer armed by the transition event at t=60_000; a1 = 0.90 exactly
        let fired = feed(&mut machine, 61_000, 30, 0.90, 0.90);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 80_000);
        assert_eq!(fired[0].1.to, ZoneStatus::Critical);
    }

    #[test]
    fn test_down_thresholds_inclusive() {
        let mut machine = StateMachine::new();
        feed(&mut machine, 0, 61, 0.95, 0.95);
        feed(&mut machine, 61_000, 21, 0.95, 0.95);
        assert_eq!(machine.status(), ZoneStatus::Critical);

        // avg_5m exactly at the critical-down bound drops to STRESSED
        let fired = feed(&mut machine, 90_000, 1, 0.5, 0.80);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1.from, ZoneStatus::Critical);
        assert_eq!(fired[0].1.to, ZoneStatus::Stressed);

        // avg_5m exactly at the stressed-down bound drops to NORMAL
        let fired = feed(&mut machine, 91_000, 1, 0.5, 0.65);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1.to, ZoneStatus::Normal);
    }

    #[test]
    fn test_condition_break_resets_confirmation() {
        let mut machine = StateMachine::new();
        // 30 s of stressed condition, timer armed at t=0
        assert!(feed(&mut machine, 0, 30, 0.8, 0.8).is_empty());
        // One condition-breaking event clears the timer
        assert!(machine.advance(30_000, 0.3, 0.3).is_none());
        // The clock restarts: 59 s of condition is not enough...
        assert!(feed(&mut machine, 31_000, 60, 0.8, 0.8).is_empty());
        // ...the 60th second after re-arming fires
        let fired = feed(&mut machine, 91_000, 1, 0.8, 0.8);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 91_000);
    }

    #[test]
    fn test_hysteresis_band_holds_stressed() {
        let mut machine = StateMachine::new();
        feed(&mut machine, 0, 61, 0.8, 0.8);
        assert_eq!(machine.status(), ZoneStatus::Stressed);

        // avg_5m oscillating strictly inside (0.65, 0.75): no transition
        for i in 0..300 {
            let a5 = if i % 2 == 0 { 0.66 } else { 0.74 };
            assert!(machine.advance(61_000 + i * 1000, 0.5, a5).is_none());
        }
        assert_eq!(machine.status(), ZoneStatus::Stressed);
    }

    #[test]
    fn test_critical_reentry_timer_armed_on_downgrade() {
        let mut machine = StateMachine::new();
        feed(&mut machine, 0, 61, 0.95, 0.95);
        feed(&mut machine, 61_000, 21, 0.95, 0.95);
        assert_eq!(machine.status(), ZoneStatus::Critical);

        // Dip drops it to STRESSED; the downgrade arms stressed_since = t
        let fired = feed(&mut machine, 90_000, 1, 0.95, 0.79);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1.to, ZoneStatus::Stressed);
        assert_eq!(machine.stressed_since, Some(90_000));
        // The same downgrade event also re-arms the critical clock (a1 high)
        assert_eq!(machine.critical_since, Some(90_000));

        // With a1 still hot, CRITICAL re-fires 20 s after the downgrade
        let fired = feed(&mut machine, 91_000, 30, 0.95, 0.85);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 110_000);
        assert_eq!(fired[0].1.to, ZoneStatus::Critical);
    }

    #[test]
    fn test_no_direct_normal_to_critical() {
        let mut machine = StateMachine::new();
        // Saturated averages from the start: first fired transition is
        // still NORMAL -> STRESSED
        let fired = feed(&mut machine, 0, 200, 1.0, 1.0);
        assert_eq!(fired[0].1.from, ZoneStatus::Normal);
        assert_eq!(fired[0].1.to, ZoneStatus::Stressed);
        for window in fired.windows(2) {
            assert_eq!(window[0].1.to, window[1].1.from);
        }
    }

    #[test]
    fn test_raising_load_never_downgrades() {
        // Monotone law: with averages only climbing, no downward transition
        let mut machine = StateMachine::new();
        let mut fired = Vec::new();
        for i in 0..400 {
            let a = (i as f64 / 400.0).min(1.0);
            if let Some(tr) = machine.advance(i * 1000, a, a) {
                fired.push(tr);
            }
        }
        for tr in &fired {
            assert!(matches!(
                (tr.from, tr.to),
                (ZoneStatus::Normal, ZoneStatus::Stressed) | (ZoneStatus::Stressed, ZoneStatus::Critical)
            ));
        }
    }

    #[test]
    fn test_zone_state_alert_dedup() {
        let mut zone = ZoneState::new("Z-1");
        let mut alerts = Vec::new();
        for i in 0..400 {
            let event = SampleEvent {
                event_id: format!("e-{}", i),
                zone_id: "Z-1".to_string(),
                latitude: 40.0,
                longitude: -74.0,
                load: 0.95,
                event_timestamp: 1_000_000 + i * 1000,
                produced_at: 1_000_000 + i * 1000,
            };
            alerts.extend(zone.observe(&event).alert);
        }
        // Exactly the two ramp alerts, 20 s apart: the dedup guard never
        // suppresses legitimate transitions
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].timestamp, 1_060_000);
        assert_eq!(alerts[1].timestamp, 1_080_000);
    }

    #[test]
    fn test_deterministic_replay() {
        let drive = || {
            let mut machine = StateMachine::new();
            let mut fired = Vec::new();
            for i in 0..720i64 {
                let a = 0.5 + 0.5 * ((i % 240) as f64 / 240.0);
                if let Some(tr) = machine.advance(i * 1000, a, a) {
                    fired.push((i * 1000, tr));
                }
            }
            fired
        };
        let first = drive();
        assert!(!first.is_empty());
        assert_eq!(first, drive());
    }
}
