//! Hardware and regulation tuning: a raw constant setpoint, manual
//! coefficient editing and relay-excitation coefficient estimation.

use core::f32::consts::PI;

use crate::config::storage::Storage;
use crate::iron::{RegulationParams, with_iron};
use crate::mode::{ModeId, Targets};
use crate::power::MAX_DUTY;
use crate::{Core, Event};

/// Internal units per encoder detent for the raw tuning setpoint.
const RAW_PER_DETENT: i32 = 8;

/// Milli-units per encoder detent when editing a coefficient.
const PARAM_PER_DETENT: i32 = 10;

/// A rotary-adjustable constant setpoint in raw internal units, used while
/// trimming the analog front end.
#[derive(Default)]
pub struct Tune {
    target: u16,
}

impl Tune {
    /// Start at the preset's internal equivalent with the element on.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.target = core.cfg.internal_for(core.cfg.preset_celsius());
        with_iron(core.iron, |iron| {
            iron.set_target(self.target);
            iron.switch_power(true);
        });
    }

    /// Adjust the raw setpoint; presses leave.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        match event {
            Some(Event::Rotate(detents)) => {
                let target = self.target as i32 + detents as i32 * RAW_PER_DETENT;
                self.target = target.clamp(0, 4095) as u16;
                with_iron(core.iron, |iron| iron.set_target(self.target));
                Some(id)
            }
            Some(Event::ShortPress) => Some(targets.on_short),
            Some(Event::LongPress) => Some(targets.on_long),
            None => Some(id),
        }
    }

    /// The raw setpoint currently applied, for display.
    pub fn target(&self) -> u16 {
        self.target
    }
}

/// Manual coefficient editing: rotate adjusts the selected coefficient
/// live, short cycles kp/ki/kd, long persists and leaves.
#[derive(Default)]
pub struct PidTune {
    params: RegulationParams,
    field: u8,
}

impl PidTune {
    /// Start from the staged coefficients, heating at the preset.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.params = core.cfg.regulation_params();
        self.field = 0;
        let target = core.cfg.internal_for(core.cfg.preset_celsius());
        with_iron(core.iron, |iron| {
            iron.set_target(target);
            iron.switch_power(true);
        });
    }

    /// Edit, cycle or commit the coefficients.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        match event {
            Some(Event::Rotate(detents)) => {
                let delta = detents as i32 * PARAM_PER_DETENT;
                let field = match self.field {
                    0 => &mut self.params.kp,
                    1 => &mut self.params.ki,
                    _ => &mut self.params.kd,
                };
                *field = (*field + delta).max(0);
                // Applied live so the effect is observable immediately.
                let params = self.params;
                with_iron(core.iron, |iron| iron.load(params));
                Some(id)
            }
            Some(Event::ShortPress) => {
                self.field = (self.field + 1) % 3;
                Some(id)
            }
            Some(Event::LongPress) => {
                core.cfg.set_regulation_params(self.params);
                if core.cfg.save().is_err() {
                    warn!("coefficients not persisted");
                }
                let params = self.params;
                with_iron(core.iron, |iron| iron.load(params));
                Some(targets.on_long)
            }
            None => Some(id),
        }
    }

    /// The coefficients as currently edited, for display.
    pub fn params(&self) -> RegulationParams {
        self.params
    }

    /// Which coefficient the rotary edits: 0 = kp, 1 = ki, 2 = kd.
    pub fn field(&self) -> u8 {
        self.field
    }
}

/// Half-cycles of sustained oscillation observed before coefficients are
/// derived.
const HALF_CYCLES: u8 = 8;

/// Hysteresis band around the setpoint for the relay switch, internal units.
const RELAY_HYSTERESIS: u16 = 16;

/// How far above the setpoint the on-phase target sits, internal units.
const RELAY_STEP: u16 = 400;

/// Relay-excitation estimation: switch heating hard on below the setpoint
/// and off above it, measure the resulting oscillation, derive
/// Ziegler-Nichols coefficients, stage them and hand off for review.
#[derive(Default)]
pub struct AutoPidTune {
    setpoint: u16,
    relay_on: bool,
    half_cycles: u8,
    last_cross_ms: u32,
    period_sum_ms: u32,
    min_temp: u16,
    max_temp: u16,
}

impl AutoPidTune {
    /// Start the excitation around the preset setpoint.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.setpoint = core.cfg.internal_for(core.cfg.preset_celsius());
        self.relay_on = true;
        self.half_cycles = 0;
        self.last_cross_ms = core.clock.now_ms();
        self.period_sum_ms = 0;
        self.min_temp = u16::MAX;
        self.max_temp = 0;
        let high = self.setpoint.saturating_add(RELAY_STEP).min(4095);
        with_iron(core.iron, |iron| {
            iron.set_target(high);
            iron.switch_power(true);
        });
        info!("auto-tune around {}", self.setpoint);
    }

    fn derive_params(&self) -> RegulationParams {
        let amplitude = (self.max_temp.saturating_sub(self.min_temp)) as f32 / 2.0;
        if amplitude < 1.0 || self.half_cycles == 0 {
            return RegulationParams {
                kp: 0,
                ki: 0,
                kd: 0,
            };
        }
        // Ultimate period from the averaged half-cycle time; relay drive
        // amplitude taken as half the duty range.
        let period_s =
            2.0 * (self.period_sum_ms as f32 / self.half_cycles as f32) / 1_000.0;
        let drive = MAX_DUTY as f32 / 2.0;
        let ku = 4.0 * drive / (PI * amplitude);

        let kp = 0.6 * ku;
        let ki = 1.2 * ku / period_s;
        let kd = 0.075 * ku * period_s;
        RegulationParams {
            kp: (kp * 1_000.0) as i32,
            ki: (ki * 1_000.0) as i32,
            kd: (kd * 1_000.0) as i32,
        }
    }

    /// Run the relay and the crossing bookkeeping; a long press aborts, a
    /// short press hands off early.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        match event {
            Some(Event::ShortPress) => return Some(targets.on_short),
            Some(Event::LongPress) => return Some(targets.on_long),
            _ => {}
        }

        let temp = with_iron(core.iron, |iron| iron.last_temp());
        self.min_temp = self.min_temp.min(temp);
        self.max_temp = self.max_temp.max(temp);

        let crossed = if self.relay_on && temp >= self.setpoint + RELAY_HYSTERESIS {
            self.relay_on = false;
            with_iron(core.iron, |iron| iron.switch_power(false));
            true
        } else if !self.relay_on && temp + RELAY_HYSTERESIS <= self.setpoint {
            self.relay_on = true;
            let high = self.setpoint.saturating_add(RELAY_STEP).min(4095);
            with_iron(core.iron, |iron| {
                iron.set_target(high);
                iron.switch_power(true);
            });
            true
        } else {
            false
        };

        if crossed {
            let now = core.clock.now_ms();
            self.period_sum_ms += now.saturating_sub(self.last_cross_ms);
            self.last_cross_ms = now;
            self.half_cycles += 1;
            if self.half_cycles >= HALF_CYCLES {
                let params = self.derive_params();
                info!(
                    "auto-tune done: kp {} ki {} kd {}",
                    params.kp, params.ki, params.kd
                );
                core.cfg.set_regulation_params(params);
                return Some(targets.on_short);
            }
        }
        Some(id)
    }
}
