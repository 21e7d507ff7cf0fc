//! Press/release classification.
//!
//! A gesture belongs to the input source that pressed first. While idle the
//! decision is deferred to the release so a short tap and a long hold can be
//! told apart; while running or inspecting the press itself is the action.

use crate::machine::PhaseKind;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputSource {
    Keyboard,
    Pointer,
    Touch,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputKind {
    Press,
    Release,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InputEvent {
    pub kind: InputKind,
    pub source: InputSource,
}

impl InputEvent {
    pub fn press(source: InputSource) -> Self {
        Self { kind: InputKind::Press, source }
    }

    pub fn release(source: InputSource) -> Self {
        Self { kind: InputKind::Release, source }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Gesture {
    /// Idle press/release pair; the machine decides tap vs hold.
    Start { held_ms: u64 },
    Stop,
    ConfirmInspection,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StartKind {
    Timer,
    Inspection,
}

/// Why an input produced no action.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ignored {
    /// Another press while a gesture is already down.
    Duplicate,
    /// The previous action has not been settled yet.
    InFlight,
    /// Post-stop display hold.
    Cooldown,
    /// Release with no matching press.
    NoPress,
    /// Release of a gesture whose action already fired on press.
    Swallowed,
    /// The current phase has no transition for this gesture.
    Unhandled,
}

pub fn classify_start(held_ms: u64, threshold_ms: u64, inspection_enabled: bool) -> StartKind {
    if inspection_enabled && held_ms > threshold_ms {
        StartKind::Inspection
    } else {
        StartKind::Timer
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tracked {
    Action { seq: u64, gesture: Gesture },
    Deferred,
    Dropped(Ignored),
}

#[derive(Debug)]
pub struct GestureTracker {
    owner: Option<InputSource>,
    pressed_at: Option<u64>,
    swallow_release: bool,
    next_seq: u64,
    in_flight: Option<u64>,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureTracker {
    pub fn new() -> Self {
        Self {
            owner: None,
            pressed_at: None,
            swallow_release: false,
            next_seq: 1,
            in_flight: None,
        }
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn is_down(&self) -> bool {
        self.owner.is_some()
    }

    pub fn on_press(&mut self, phase: PhaseKind, source: InputSource, now_ms: u64) -> Tracked {
        if self.owner.is_some() {
            return Tracked::Dropped(Ignored::Duplicate);
        }
        if self.in_flight.is_some() {
            return Tracked::Dropped(Ignored::InFlight);
        }
        self.owner = Some(source);

        match phase {
            PhaseKind::Idle => {
                self.pressed_at = Some(now_ms);
                Tracked::Deferred
            }
            PhaseKind::Running => {
                self.swallow_release = true;
                self.dispatch(Gesture::Stop)
            }
            PhaseKind::Inspecting => {
                self.swallow_release = true;
                self.dispatch(Gesture::ConfirmInspection)
            }
            PhaseKind::Cooldown => {
                self.swallow_release = true;
                Tracked::Dropped(Ignored::Cooldown)
            }
        }
    }

    pub fn on_release(&mut self, phase: PhaseKind, source: InputSource, now_ms: u64) -> Tracked {
        match self.owner {
            Some(owner) if owner == source => {}
            Some(_) => return Tracked::Dropped(Ignored::Duplicate),
            None => return Tracked::Dropped(Ignored::NoPress),
        }
        self.owner = None;
        let pressed_at = self.pressed_at.take();
        if std::mem::take(&mut self.swallow_release) {
            return Tracked::Dropped(Ignored::Swallowed);
        }

        match (phase, pressed_at) {
            (PhaseKind::Idle, Some(at)) => self.dispatch(Gesture::Start {
                held_ms: now_ms.saturating_sub(at),
            }),
            (PhaseKind::Cooldown, _) => Tracked::Dropped(Ignored::Cooldown),
            _ => Tracked::Dropped(Ignored::Swallowed),
        }
    }

    /// Marks action `seq` as fully applied. Stale sequence numbers are ignored.
    pub fn settle(&mut self, seq: u64) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    fn dispatch(&mut self, gesture: Gesture) -> Tracked {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(seq);
        Tracked::Action { seq, gesture }
    }
}
