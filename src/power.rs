//! The commanded-duty cell and output-stage limits.
//!
//! The output stage consumes [`DutyCell`] asynchronously; everything that
//! writes it runs in interrupt context except the scheduler's
//! power-off-before-switch path, so the cell is a plain atomic.

use core::sync::atomic::{AtomicU16, Ordering};

/// The PWM period of the output stage, in timer counts.
pub const PWM_PERIOD: u16 = 1980;

/// Upper duty limit: 20 counts below the period, so the output pin always
/// sees a falling edge within a cycle.
pub const MAX_DUTY: u16 = PWM_PERIOD - 20;

/// The duty applied periodically solely to test element connectivity.
pub const PROBE_DUTY: u16 = 5;

/// Temperature-completion cycles between connectivity probes.
pub const CHECK_PERIOD: u8 = 6;

/// The commanded duty value driving the output stage.
///
/// Mirrors a compare register: a single `u16`, written atomically, read
/// by the output stage and by both execution contexts.
#[derive(Debug, Default)]
pub struct DutyCell(AtomicU16);

impl DutyCell {
    /// A cell commanding zero duty.
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Read the commanded duty.
    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }

    /// Command a new duty value.
    pub fn set(&self, duty: u16) {
        self.0.store(duty, Ordering::Relaxed);
    }

    /// Command zero duty (element unpowered).
    pub fn clear(&self) {
        self.set(0);
    }

    /// Whether the element is currently powered at all.
    pub fn is_powered(&self) -> bool {
        self.get() != 0
    }
}
