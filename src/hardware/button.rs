#![allow(dead_code)]
use std::time::{Duration, Instant};

/// Minimum time a level must hold before it's accepted as a real edge,
/// filtering mechanical contact bounce.
const JITTER: Duration = Duration::from_millis(20);

/// Hold time past which a press is classified as long rather than short.
const LONG_PRESS: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Idle,
    Debouncing(bool),
    Pressed,
}

/// Debounces a single button pin and classifies each completed press as
/// short or long (spec.md §4.12, the button long/short press state
/// machine supplementing the protocol component design).
pub struct ButtonDebouncer {
    state: PressState,
    edge_at: Instant,
    pressed_at: Option<Instant>,
}

impl ButtonDebouncer {
    pub fn new() -> Self {
        Self {
            state: PressState::Idle,
            edge_at: Instant::now(),
            pressed_at: None,
        }
    }

    /// Feed one raw pin sample (`true` = pressed) at time `now`. Returns a
    /// [`ButtonEvent`] exactly once, at the moment a press completes (the
    /// pin returns to released after having been debounced-pressed).
    pub fn sample(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        match self.state {
            PressState::Idle => {
                if pressed {
                    self.state = PressState::Debouncing(true);
                    self.edge_at = now;
                }
                None
            }
            PressState::Debouncing(target) => {
                if pressed != target {
                    // bounced back before the jitter window elapsed; abandon.
                    self.state = PressState::Idle;
                    return None;
                }
                if now.duration_since(self.edge_at) < JITTER {
                    return None;
                }
                if target {
                    self.state = PressState::Pressed;
                    self.pressed_at = Some(now);
                } else {
                    self.state = PressState::Idle;
                }
                None
            }
            PressState::Pressed => {
                if pressed {
                    return None;
                }
                self.state = PressState::Debouncing(false);
                self.edge_at = now;
                let held = self
                    .pressed_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or_default();
                self.pressed_at = None;
                Some(if held >= LONG_PRESS {
                    ButtonEvent::Long
                } else {
                    ButtonEvent::Short
                })
            }
        }
    }
}

impl Default for ButtonDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
