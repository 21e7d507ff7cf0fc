//! The timer display state machine: idle, inspecting, running, cooldown.

use crate::gesture::{classify_start, Gesture, GestureTracker, Ignored, InputEvent, InputKind, StartKind, Tracked};
use crate::{InspectionCountdown, Stopwatch};

pub const DEFAULT_INSPECTION_DELAY_MS: u64 = 200;
pub const DEFAULT_INSPECTION_SECS: u32 = 15;
pub const DEFAULT_DISPLAY_HOLD_MS: u64 = 1500;

const RUNNING_REFRESH_MS: u64 = 16;
const INSPECTING_REFRESH_MS: u64 = 100;
const COOLDOWN_REFRESH_MS: u64 = 50;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MachineConfig {
    pub inspection_enabled: bool,
    /// Holds strictly longer than this start inspection.
    pub inspection_delay_ms: u64,
    pub inspection_secs: u32,
    pub display_hold_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            inspection_enabled: true,
            inspection_delay_ms: DEFAULT_INSPECTION_DELAY_MS,
            inspection_secs: DEFAULT_INSPECTION_SECS,
            display_hold_ms: DEFAULT_DISPLAY_HOLD_MS,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Phase {
    Idle,
    Inspecting(InspectionCountdown),
    Running(Stopwatch),
    Cooldown { elapsed_ms: u64, until_ms: u64 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PhaseKind {
    Idle,
    Inspecting,
    Running,
    Cooldown,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Inspecting(_) => PhaseKind::Inspecting,
            Phase::Running(_) => PhaseKind::Running,
            Phase::Cooldown { .. } => PhaseKind::Cooldown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Transition {
    InspectionStarted { seconds: u32 },
    TimerStarted,
    /// The solve is finished; the caller hands `elapsed_ms` to the recorder.
    TimerStopped { elapsed_ms: u64 },
    Cancelled,
    CooldownFinished,
}

/// A transition caused by user input, tagged with its action sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Step {
    pub seq: u64,
    pub transition: Transition,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    Moved(Step),
    /// Press recorded; the decision comes with the release.
    Pending,
    Ignored(Ignored),
}

#[derive(Debug)]
pub struct TimerMachine {
    config: MachineConfig,
    phase: Phase,
    gestures: GestureTracker,
}

impl TimerMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            gestures: GestureTracker::new(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// New values apply from the next gesture on; a running phase keeps going.
    pub fn set_config(&mut self, config: MachineConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.gestures.in_flight()
    }

    /// A press is held and its release has not arrived yet.
    pub fn gesture_down(&self) -> bool {
        self.gestures.is_down()
    }

    pub fn input(&mut self, event: InputEvent, now_ms: u64) -> Outcome {
        let kind = self.phase.kind();
        let tracked = match event.kind {
            InputKind::Press => self.gestures.on_press(kind, event.source, now_ms),
            InputKind::Release => self.gestures.on_release(kind, event.source, now_ms),
        };

        match tracked {
            Tracked::Deferred => Outcome::Pending,
            Tracked::Dropped(reason) => Outcome::Ignored(reason),
            Tracked::Action { seq, gesture } => match self.apply(gesture, now_ms) {
                Some(transition) => Outcome::Moved(Step { seq, transition }),
                None => {
                    self.gestures.settle(seq);
                    Outcome::Ignored(Ignored::Unhandled)
                }
            },
        }
    }

    fn apply(&mut self, gesture: Gesture, now_ms: u64) -> Option<Transition> {
        match (self.phase, gesture) {
            (Phase::Idle, Gesture::Start { held_ms }) => {
                let kind = classify_start(
                    held_ms,
                    self.config.inspection_delay_ms,
                    self.config.inspection_enabled,
                );
                match kind {
                    StartKind::Inspection => {
                        let seconds = self.config.inspection_secs;
                        self.phase = Phase::Inspecting(InspectionCountdown::new(seconds, now_ms));
                        Some(Transition::InspectionStarted { seconds })
                    }
                    StartKind::Timer => Some(self.start_running(now_ms)),
                }
            }
            (Phase::Inspecting(_), Gesture::ConfirmInspection) => Some(self.start_running(now_ms)),
            (Phase::Running(stopwatch), Gesture::Stop) => {
                let elapsed_ms = stopwatch.stop(now_ms);
                self.phase = Phase::Cooldown {
                    elapsed_ms,
                    until_ms: now_ms.saturating_add(self.config.display_hold_ms),
                };
                Some(Transition::TimerStopped { elapsed_ms })
            }
            _ => None,
        }
    }

    fn start_running(&mut self, now_ms: u64) -> Transition {
        self.phase = Phase::Running(Stopwatch::start(now_ms));
        Transition::TimerStarted
    }

    /// Time-driven transitions: inspection running out and the display hold ending.
    pub fn tick(&mut self, now_ms: u64) -> Option<Transition> {
        match self.phase {
            Phase::Inspecting(countdown) if countdown.is_complete(now_ms) => {
                Some(self.start_running(now_ms))
            }
            Phase::Cooldown { until_ms, .. } if now_ms >= until_ms => {
                self.phase = Phase::Idle;
                if let Some(seq) = self.gestures.in_flight() {
                    self.gestures.settle(seq);
                }
                Some(Transition::CooldownFinished)
            }
            _ => None,
        }
    }

    /// Auxiliary cancel control; nothing is recorded.
    pub fn cancel(&mut self) -> Option<Transition> {
        match self.phase {
            Phase::Inspecting(_) | Phase::Running(_) => {
                self.phase = Phase::Idle;
                if let Some(seq) = self.gestures.in_flight() {
                    self.gestures.settle(seq);
                }
                Some(Transition::Cancelled)
            }
            Phase::Idle | Phase::Cooldown { .. } => None,
        }
    }

    pub fn settle(&mut self, seq: u64) -> bool {
        self.gestures.settle(seq)
    }

    /// Live elapsed time while running, the frozen result during cooldown.
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        match self.phase {
            Phase::Running(stopwatch) => Some(stopwatch.elapsed_ms(now_ms)),
            Phase::Cooldown { elapsed_ms, .. } => Some(elapsed_ms),
            Phase::Idle | Phase::Inspecting(_) => None,
        }
    }

    pub fn inspection_remaining_s(&self, now_ms: u64) -> Option<i64> {
        match self.phase {
            Phase::Inspecting(countdown) => Some(countdown.remaining_s(now_ms)),
            _ => None,
        }
    }

    pub fn shows_cancel(&self) -> bool {
        matches!(self.phase, Phase::Inspecting(_) | Phase::Running(_))
    }

    /// Refresh cadence bound to the current phase; `None` means no ticker.
    pub fn refresh_interval_ms(&self) -> Option<u64> {
        match self.phase {
            Phase::Idle => None,
            Phase::Inspecting(_) => Some(INSPECTING_REFRESH_MS),
            Phase::Running(_) => Some(RUNNING_REFRESH_MS),
            Phase::Cooldown { .. } => Some(COOLDOWN_REFRESH_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::InputSource;

    const KEY: InputSource = InputSource::Keyboard;

    fn press(m: &mut TimerMachine, now: u64) -> Outcome {
        m.input(InputEvent::press(KEY), now)
    }

    fn release(m: &mut TimerMachine, now: u64) -> Outcome {
        m.input(InputEvent::release(KEY), now)
    }

    fn moved(outcome: Outcome) -> Step {
        match outcome {
            Outcome::Moved(step) => step,
            other => panic!("expected a transition, got {:?}", other),
        }
    }

    #[test]
    fn test_tap_starts_timer_then_stop_and_cooldown() {
        let mut m = TimerMachine::new(MachineConfig::default());
        assert_eq!(m.kind(), PhaseKind::Idle);
        assert!(!m.shows_cancel());

        assert_eq!(press(&mut m, 0), Outcome::Pending);
        assert!(m.gesture_down());
        let step = moved(release(&mut m, 50));
        assert!(!m.gesture_down());
        assert_eq!(step.transition, Transition::TimerStarted);
        assert_eq!(m.kind(), PhaseKind::Running);
        assert!(m.shows_cancel());
        assert!(m.settle(step.seq));

        assert_eq!(m.elapsed_ms(1_050), Some(1_000));
        let step = moved(press(&mut m, 2_050));
        assert_eq!(step.transition, Transition::TimerStopped { elapsed_ms: 2_000 });
        assert_eq!(m.kind(), PhaseKind::Cooldown);
        assert!(!m.shows_cancel());
        assert_eq!(m.elapsed_ms(3_000), Some(2_000));
        assert_eq!(release(&mut m, 2_100), Outcome::Ignored(Ignored::Swallowed));

        assert_eq!(m.tick(3_549), None);
        assert_eq!(m.tick(3_550), Some(Transition::CooldownFinished));
        assert_eq!(m.kind(), PhaseKind::Idle);
        assert_eq!(m.in_flight(), None);
    }

    #[test]
    fn test_hold_starts_inspection_and_autostarts() {
        let mut m = TimerMachine::new(MachineConfig::default());
        press(&mut m, 0);
        let step = moved(release(&mut m, 250));
        assert_eq!(step.transition, Transition::InspectionStarted { seconds: 15 });
        m.settle(step.seq);

        assert_eq!(m.inspection_remaining_s(250), Some(15));
        assert_eq!(m.inspection_remaining_s(1_250), Some(14));
        assert_eq!(m.tick(15_249), None);
        assert_eq!(m.tick(15_250), Some(Transition::TimerStarted));
        match m.phase() {
            Phase::Running(sw) => assert_eq!(sw.started_at(), 15_250),
            other => panic!("unexpected phase {:?}", other),
        }
    }

    #[test]
    fn test_press_during_inspection_starts_timer() {
        let mut m = TimerMachine::new(MachineConfig::default());
        press(&mut m, 0);
        let step = moved(release(&mut m, 400));
        m.settle(step.seq);

        let step = moved(press(&mut m, 5_000));
        assert_eq!(step.transition, Transition::TimerStarted);
        assert_eq!(m.inspection_remaining_s(5_000), None);
        assert_eq!(m.elapsed_ms(5_700), Some(700));
        // The release of the confirming press must not stop the new solve.
        assert_eq!(release(&mut m, 5_100), Outcome::Ignored(Ignored::Swallowed));
        assert_eq!(m.kind(), PhaseKind::Running);
    }

    #[test]
    fn test_inspection_disabled_always_runs() {
        let config = MachineConfig { inspection_enabled: false, ..MachineConfig::default() };
        let mut m = TimerMachine::new(config);
        press(&mut m, 0);
        let step = moved(release(&mut m, 10_000));
        assert_eq!(step.transition, Transition::TimerStarted);
    }

    #[test]
    fn test_threshold_is_exclusive_and_configurable() {
        let config = MachineConfig { inspection_delay_ms: 500, ..MachineConfig::default() };
        let mut m = TimerMachine::new(config);
        press(&mut m, 0);
        assert_eq!(moved(release(&mut m, 500)).transition, Transition::TimerStarted);

        let mut m = TimerMachine::new(config);
        press(&mut m, 0);
        assert_eq!(
            moved(release(&mut m, 501)).transition,
            Transition::InspectionStarted { seconds: 15 }
        );
    }

    #[test]
    fn test_cooldown_ignores_input() {
        let mut m = TimerMachine::new(MachineConfig::default());
        press(&mut m, 0);
        let step = moved(release(&mut m, 10));
        m.settle(step.seq);
        let step = moved(press(&mut m, 1_000));
        release(&mut m, 1_050);
        m.settle(step.seq);

        assert_eq!(press(&mut m, 1_200), Outcome::Ignored(Ignored::Cooldown));
        assert_eq!(release(&mut m, 1_300), Outcome::Ignored(Ignored::Swallowed));
        assert_eq!(m.kind(), PhaseKind::Cooldown);
    }

    #[test]
    fn test_unsettled_action_blocks_next_press() {
        let mut m = TimerMachine::new(MachineConfig::default());
        press(&mut m, 0);
        moved(release(&mut m, 10));
        assert_eq!(press(&mut m, 20), Outcome::Ignored(Ignored::InFlight));
        assert_eq!(m.kind(), PhaseKind::Running);
    }

    #[test]
    fn test_cancel() {
        let mut m = TimerMachine::new(MachineConfig::default());
        assert_eq!(m.cancel(), None);
        press(&mut m, 0);
        moved(release(&mut m, 300));
        assert_eq!(m.cancel(), Some(Transition::Cancelled));
        assert_eq!(m.kind(), PhaseKind::Idle);
        assert_eq!(m.in_flight(), None);
        assert_eq!(m.tick(60_000), None);
    }

    #[test]
    fn test_refresh_interval_follows_phase() {
        let mut m = TimerMachine::new(MachineConfig::default());
        assert_eq!(m.refresh_interval_ms(), None);
        press(&mut m, 0);
        let step = moved(release(&mut m, 300));
        m.settle(step.seq);
        assert_eq!(m.refresh_interval_ms(), Some(INSPECTING_REFRESH_MS));
        moved(press(&mut m, 400));
        assert_eq!(m.refresh_interval_ms(), Some(RUNNING_REFRESH_MS));
    }

    #[test]
    fn test_config_change_applies_to_next_gesture() {
        let mut m = TimerMachine::new(MachineConfig::default());
        m.set_config(MachineConfig { inspection_secs: 8, ..MachineConfig::default() });
        press(&mut m, 0);
        assert_eq!(
            moved(release(&mut m, 300)).transition,
            Transition::InspectionStarted { seconds: 8 }
        );
        assert_eq!(m.config().inspection_secs, 8);
    }

    #[test]
    fn test_no_input_sequence_runs_two_stopwatches() {
        let sources = [InputSource::Keyboard, InputSource::Pointer, InputSource::Touch];
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..50 {
            let mut m = TimerMachine::new(MachineConfig::default());
            let mut now = 0u64;
            let mut running = 0i32;
            for _ in 0..400 {
                now += next() % 700;
                let r = next();
                let source = sources[(r % 3) as usize];
                let outcome = match (r >> 8) % 6 {
                    0 | 1 => m.input(InputEvent::press(source), now),
                    2 | 3 => m.input(InputEvent::release(source), now),
                    4 => {
                        if let Some(seq) = m.in_flight() {
                            m.settle(seq);
                        }
                        m.tick(now).map(|t| Outcome::Moved(Step { seq: 0, transition: t }))
                            .unwrap_or(Outcome::Pending)
                    }
                    _ => m.cancel().map(|t| Outcome::Moved(Step { seq: 0, transition: t }))
                        .unwrap_or(Outcome::Pending),
                };
                if let Outcome::Moved(step) = outcome {
                    match step.transition {
                        Transition::TimerStarted => running += 1,
                        Transition::TimerStopped { .. } | Transition::Cancelled => {
                            running = 0;
                        }
                        _ => {}
                    }
                }
                assert!(running <= 1, "two stopwatches at once");
                assert_eq!(running == 1, m.kind() == PhaseKind::Running);
                assert_eq!(
                    m.inspection_remaining_s(now).is_some(),
                    m.kind() == PhaseKind::Inspecting
                );
            }
        }
    }
}
