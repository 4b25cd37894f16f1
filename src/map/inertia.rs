use super::pixel::ViewportPixel;
use glam::DVec2;
use std::time::{Duration, Instant};

/// Sampling and coasting period
pub const INERTIA_TICK: Duration = Duration::from_millis(20);

/// Ticks a released drag takes to come to rest
const DECELERATION_STEPS: u32 = 20;

/// Coasting speed cap per axis, in pixels per tick
const MAX_SPEED_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KineticState {
    #[default]
    Steady,
    /// Button down, not moved yet
    Pressed,
    /// Dragging, the map follows the pointer 1:1
    ManualScroll,
    /// Released mid-drag, coasting to a stop
    AutoScroll,
}

/// Drag-and-release kinetic scrolling, free of any input toolkit.
///
/// Feed it pointer presses, moves and releases, and call
/// [`advance`](Self::advance) regularly. Scroll deltas come back as world
/// pixel offsets for the caller to apply.
#[derive(Debug, Clone)]
pub struct Inertia {
    state: KineticState,
    /// Pointer position at the last move
    pointer: ViewportPixel,
    /// Pointer position at the last sampling tick
    sampled: ViewportPixel,
    speed: DVec2,
    steps_left: u32,
    next_tick: Instant,
}

impl Default for Inertia {
    fn default() -> Self {
        Self {
            state: KineticState::Steady,
            pointer: ViewportPixel::default(),
            sampled: ViewportPixel::default(),
            speed: DVec2::ZERO,
            steps_left: 0,
            next_tick: Instant::now(),
        }
    }
}

impl Inertia {
    pub fn state(&self) -> KineticState {
        self.state
    }

    /// Button down. Stops a coasting map without starting a new drag.
    pub fn press(&mut self) {
        self.state = match self.state {
            KineticState::Steady => KineticState::Pressed,
            KineticState::AutoScroll => KineticState::Steady,
            other => other,
        };
    }

    /// Pointer moved to `px`. Returns the scroll to apply, if any.
    pub fn drag(&mut self, px: ViewportPixel, now: Instant) -> Option<DVec2> {
        match self.state {
            KineticState::Pressed => {
                self.pointer = px;
                self.sampled = px;
                self.speed = DVec2::ZERO;
                self.steps_left = 0;
                self.next_tick = now + INERTIA_TICK;
                self.state = KineticState::ManualScroll;
                None
            }
            KineticState::ManualScroll => {
                let delta = self.pointer - px;
                self.pointer = px;
                Some(delta)
            }
            _ => None,
        }
    }

    /// Button up. A drag in progress starts coasting.
    pub fn release(&mut self) {
        self.state = match self.state {
            KineticState::Pressed => KineticState::Steady,
            KineticState::ManualScroll => KineticState::AutoScroll,
            other => other,
        };
    }

    /// Run every tick due at `now`, passing each coasting step to `scroll`.
    /// Returns true while the map is still coasting.
    pub fn advance(&mut self, now: Instant, mut scroll: impl FnMut(DVec2)) -> bool {
        match self.state {
            KineticState::ManualScroll if self.next_tick <= now => {
                // Only the latest sample matters while dragging
                self.speed = self.sampled - self.pointer;
                self.steps_left = DECELERATION_STEPS;
                self.sampled = self.pointer;
                self.next_tick = now + INERTIA_TICK;
            }
            KineticState::AutoScroll => {
                while self.state == KineticState::AutoScroll && self.next_tick <= now {
                    self.decelerate();
                    scroll(self.speed);
                    if self.speed == DVec2::ZERO {
                        self.state = KineticState::Steady;
                    }
                    self.next_tick += INERTIA_TICK;
                }
            }
            _ => {}
        }
        self.state == KineticState::AutoScroll
    }

    fn decelerate(&mut self) {
        if self.steps_left == 0 {
            self.speed = DVec2::ZERO;
            return;
        }
        let capped = self.speed.clamp(DVec2::splat(-MAX_SPEED_PX), DVec2::splat(MAX_SPEED_PX));
        self.speed = capped - capped / self.steps_left as f64;
        self.steps_left -= 1;
    }
}
