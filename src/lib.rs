//! Control core of a T12 bench soldering/rework station.
//!
//! The crate holds the three tightly coupled pieces that make the station a
//! real-time control system:
//!
//! - [`acquisition`]: the interrupt-driven state machine that sequences
//!   current and temperature sampling and commands the heater duty each
//!   cycle,
//! - [`scheduler`] and [`mode`]: the finite-state mode scheduler that walks
//!   the operating modes (standby, heating, boost, calibration, tuning,
//!   diagnostics, fail-lock) and cuts power on every transition,
//! - [`config`]: the persisted configuration and per-tip calibration model
//!   with checksum validation.
//!
//! Hardware stays behind narrow traits ([`Panel`], [`Buzzer`],
//! [`TiltSensor`], [`Monotonic`], [`config::storage::Storage`],
//! [`acquisition::Sampler`]); firmware wires them to peripherals, host tests
//! wire them to simulated collaborators and drive the same entry points the
//! ISRs would.
#![no_std]
#![warn(missing_docs)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod acquisition;
pub mod config;
pub mod iron;
pub mod mode;
pub mod power;
pub mod scheduler;

use embedded_hal::delay::DelayNs;

use crate::config::storage::Storage;
use crate::config::{CfgStatus, Config};
use crate::iron::{IronMutex, with_iron};
use crate::power::DutyCell;

/// A navigation event, delivered pre-debounced by the input collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The encoder was rotated by the given number of detents.
    Rotate(i16),
    /// A short press was registered.
    ShortPress,
    /// A long press was registered.
    LongPress,
}

/// The display collaborator, reduced to the single path the core uses.
pub trait Panel {
    /// Show a fixed diagnostic message.
    fn show_error(&mut self, message: &str);
}

/// The audible-feedback collaborator.
pub trait Buzzer {
    /// Enable or disable all audible feedback.
    fn enable(&mut self, enabled: bool);
    /// A short confirmation beep.
    fn short_beep(&mut self);
    /// A failure tone.
    fn failure_beep(&mut self);
}

/// The tilt/motion switch built into the iron handle.
pub trait TiltSensor {
    /// Reports whether motion was registered since the last poll.
    fn is_active(&self) -> bool;
}

/// A monotonic millisecond clock.
pub trait Monotonic {
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u32;
}

/// The device context handed to every mode: configuration store, shared
/// controller state and the collaborator objects. One instance exists, owned
/// at the top level.
pub struct Core<'d, S: Storage> {
    /// The configuration store.
    pub cfg: Config<S>,
    /// The power controller, shared with interrupt context.
    pub iron: &'d IronMutex,
    /// The commanded duty value, consumed by the output stage.
    pub duty: &'d DutyCell,
    /// The display boundary.
    pub panel: &'d mut dyn Panel,
    /// The buzzer boundary.
    pub buzzer: &'d mut dyn Buzzer,
    /// The iron-handle tilt switch.
    pub sensor: &'d dyn TiltSensor,
    /// The monotonic clock used for mode timeouts.
    pub clock: &'d dyn Monotonic,
    /// Blocking delay, used once at startup.
    pub delay: &'d mut dyn DelayNs,
}

impl<S: Storage> Core<'_, S> {
    /// Initialize the device context: load the configuration, hand the
    /// regulation parameters to the iron and arm the buzzer. Returns the
    /// configuration status consumed by [`scheduler::Scheduler::start`].
    pub fn init(&mut self) -> CfgStatus {
        let status = self.cfg.init();
        let params = self.cfg.regulation_params();
        with_iron(self.iron, |iron| iron.load(params));
        self.buzzer.enable(self.cfg.is_buzzer_enabled());
        info!("core init");
        status
    }
}
