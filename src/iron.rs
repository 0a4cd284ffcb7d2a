//! The power controller: turns measured temperature into a commanded duty
//! value, tracks element connectivity and the handle tilt switch.
//!
//! The regulation arithmetic itself belongs to the `pid` crate; this module
//! owns the contract around it. [`Iron`] is written by interrupt context
//! (acquisition completion) and read/commanded by the foreground loop, so it
//! lives behind a critical-section mutex.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use pid::Pid;

use crate::power::MAX_DUTY;

/// The persisted regulation-loop coefficients, in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegulationParams {
    /// Proportional coefficient × 1000.
    pub kp: i32,
    /// Integral coefficient × 1000.
    pub ki: i32,
    /// Derivative coefficient × 1000.
    pub kd: i32,
}

/// Scale between persisted integer coefficients and controller gains.
const PARAM_SCALE: f32 = 1000.0;

/// Raw current readings at or above this level count as a connected element.
const CURRENT_DETECT_THRESHOLD: u16 = 160;

/// Consecutive below-threshold current readings before the element is
/// considered disconnected.
const MAX_CURRENT_MISSES: u8 = 3;

/// Band around the setpoint, in internal units, treated as on-target.
const ON_TARGET_MARGIN: u16 = 16;

/// The iron's power controller.
pub struct Iron {
    /// The temperature regulation loop.
    pid: Pid<f32>,
    /// The setpoint, in internal sensor units.
    target: u16,
    /// Whether the element is switched on.
    powered: bool,
    /// Whether current history indicates a connected element.
    connected: bool,
    /// Consecutive current readings below the detection threshold.
    current_misses: u8,
    /// The most recent averaged temperature reading.
    last_temp: u16,
    /// The most recent averaged ambient reading.
    ambient_raw: u16,
    /// When the tilt switch last reported motion.
    last_motion_ms: u32,
}

impl Iron {
    /// A controller with neutral gains, switched off and not connected.
    pub fn new() -> Self {
        Self {
            pid: Pid::new(0.0, MAX_DUTY as f32),
            target: 0,
            powered: false,
            connected: false,
            current_misses: 0,
            last_temp: 0,
            ambient_raw: 0,
            last_motion_ms: 0,
        }
    }

    /// Load regulation parameters, replacing the controller state.
    pub fn load(&mut self, params: RegulationParams) {
        let mut pid = Pid::new(self.target as f32, MAX_DUTY as f32);
        pid.p(params.kp as f32 / PARAM_SCALE, MAX_DUTY as f32)
            .i(params.ki as f32 / PARAM_SCALE, MAX_DUTY as f32)
            .d(params.kd as f32 / PARAM_SCALE, MAX_DUTY as f32);
        self.pid = pid;
        debug!("iron gains loaded: {} {} {}", params.kp, params.ki, params.kd);
    }

    /// Set the temperature setpoint, in internal units.
    ///
    /// A changed setpoint resets the integral term so the loop does not carry
    /// windup across operating points.
    pub fn set_target(&mut self, target: u16) {
        if target != self.target {
            self.target = target;
            self.pid.reset_integral_term();
            self.pid.setpoint(target as f32);
        }
    }

    /// The current setpoint, in internal units.
    pub fn target(&self) -> u16 {
        self.target
    }

    /// Run one regulation step for the given temperature reading and return
    /// the duty value to command.
    ///
    /// Returns zero while switched off. Never mutates connectivity state;
    /// that is judged from current history only.
    pub fn power(&mut self, temp: u16) -> u16 {
        if !self.powered {
            return 0;
        }
        let output = self.pid.next_control_output(temp as f32).output;
        if output <= 0.0 { 0 } else { output as u16 }
    }

    /// Record the most recent averaged temperature reading.
    pub fn record_temperature(&mut self, temp: u16) {
        self.last_temp = temp;
    }

    /// The most recent averaged temperature reading, in internal units.
    pub fn last_temp(&self) -> u16 {
        self.last_temp
    }

    /// Whether the last reading sits within the on-target band.
    pub fn is_on_target(&self) -> bool {
        self.last_temp.abs_diff(self.target) <= ON_TARGET_MARGIN
    }

    /// Feed a current reading taken while the element was powered.
    pub fn update_current(&mut self, current: u16) {
        if current >= CURRENT_DETECT_THRESHOLD {
            if !self.connected {
                debug!("element connected (current {})", current);
            }
            self.connected = true;
            self.current_misses = 0;
        } else {
            self.current_misses = self.current_misses.saturating_add(1);
            if self.current_misses >= MAX_CURRENT_MISSES && self.connected {
                warn!("element disconnected");
                self.connected = false;
            }
        }
    }

    /// Whether current history indicates a connected element.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Switch the element on or off.
    ///
    /// Safe to call at any time, including mid-acquisition; it only flips the
    /// flag consumed by [`Iron::power`] and clears loop windup on power-off.
    pub fn switch_power(&mut self, on: bool) {
        if self.powered && !on {
            self.pid.reset_integral_term();
        }
        self.powered = on;
    }

    /// Whether the element is switched on.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Record an averaged ambient-sensor reading.
    pub fn update_ambient(&mut self, ambient: u16) {
        self.ambient_raw = ambient;
    }

    /// The most recent averaged ambient reading, in raw counts.
    pub fn ambient_raw(&self) -> u16 {
        self.ambient_raw
    }

    /// Ambient temperature in °C, from a linear fit of the board sensor over
    /// its working range.
    pub fn ambient_celsius(&self) -> i8 {
        let deg = (self.ambient_raw as i32 * 70) / 4096 - 10;
        deg.clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    /// Update tilt-switch bookkeeping from a sensor poll.
    pub fn check_switch_status(&mut self, active: bool, now_ms: u32) {
        if active {
            self.last_motion_ms = now_ms;
        }
    }

    /// Milliseconds since the tilt switch last reported motion.
    pub fn idle_for_ms(&self, now_ms: u32) -> u32 {
        now_ms.saturating_sub(self.last_motion_ms)
    }
}

impl Default for Iron {
    fn default() -> Self {
        Self::new()
    }
}

/// The iron shared between the foreground loop and interrupt context.
pub type IronMutex = Mutex<CriticalSectionRawMutex, RefCell<Iron>>;

/// Run a closure against the shared iron inside its critical section.
pub fn with_iron<R>(iron: &IronMutex, f: impl FnOnce(&mut Iron) -> R) -> R {
    iron.lock(|cell| f(&mut cell.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heated_iron() -> Iron {
        let mut iron = Iron::new();
        iron.load(RegulationParams {
            kp: 3000,
            ki: 60,
            kd: 500,
        });
        iron
    }

    #[test]
    fn power_is_zero_while_switched_off() {
        let mut iron = heated_iron();
        iron.set_target(2500);
        assert_eq!(iron.power(1000), 0);

        iron.switch_power(true);
        assert!(iron.power(1000) > 0);
    }

    #[test]
    fn power_never_exceeds_the_duty_limit() {
        let mut iron = heated_iron();
        iron.set_target(4000);
        iron.switch_power(true);
        for temp in [0u16, 100, 2000, 3990] {
            assert!(iron.power(temp) <= MAX_DUTY);
        }
    }

    #[test]
    fn connectivity_needs_consecutive_misses() {
        let mut iron = heated_iron();
        assert!(!iron.is_connected());

        iron.update_current(CURRENT_DETECT_THRESHOLD);
        assert!(iron.is_connected());

        // One good reading in between resets the miss counter.
        iron.update_current(0);
        iron.update_current(0);
        iron.update_current(CURRENT_DETECT_THRESHOLD + 40);
        assert!(iron.is_connected());

        iron.update_current(0);
        iron.update_current(0);
        iron.update_current(0);
        assert!(!iron.is_connected());
    }

    #[test]
    fn power_does_not_change_connectivity() {
        let mut iron = heated_iron();
        iron.update_current(500);
        iron.switch_power(true);
        iron.set_target(3000);
        for _ in 0..10 {
            iron.power(100);
        }
        assert!(iron.is_connected());
    }

    #[test]
    fn tilt_switch_idle_time() {
        let mut iron = heated_iron();
        iron.check_switch_status(true, 1_000);
        iron.check_switch_status(false, 5_000);
        assert_eq!(iron.idle_for_ms(5_000), 4_000);

        iron.check_switch_status(true, 6_000);
        assert_eq!(iron.idle_for_ms(6_000), 0);
    }
}
