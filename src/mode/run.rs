//! The everyday modes: standby, regulated heating and boost, plus the raw
//! diagnostics view.

use crate::config::storage::Storage;
use crate::config::{TEMP_MAX_C, TEMP_MIN_C};
use crate::iron::with_iron;
use crate::mode::{ModeId, Targets};
use crate::{Core, Event};

/// Degrees per encoder detent when adjusting a setpoint.
const DEG_PER_DETENT: i32 = 5;

fn adjusted_preset<S: Storage>(core: &Core<'_, S>, detents: i16) -> u16 {
    let deg = core.cfg.preset_celsius() as i32 + detents as i32 * DEG_PER_DETENT;
    deg.clamp(TEMP_MIN_C as i32, TEMP_MAX_C as i32) as u16
}

/// Element off; the rotary adjusts the preset temperature.
#[derive(Default)]
pub struct Standby;

impl Standby {
    /// Re-apply the preset so the idle display shows the right setpoint.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        // Keep the setpoint current so the display and a following Work
        // entry agree.
        let target = core.cfg.internal_for(core.cfg.preset_celsius());
        with_iron(core.iron, |iron| iron.set_target(target));
    }

    /// Adjust the preset or leave; a short press persists the preset first.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        match event {
            Some(Event::Rotate(detents)) => {
                let preset = adjusted_preset(core, detents);
                core.cfg.set_preset_celsius(preset);
                let target = core.cfg.internal_for(preset);
                with_iron(core.iron, |iron| iron.set_target(target));
                Some(id)
            }
            Some(Event::ShortPress) => {
                // The adjusted preset is persisted when heating starts.
                if core.cfg.save().is_err() {
                    warn!("preset not persisted");
                }
                Some(targets.on_short)
            }
            Some(Event::LongPress) => Some(targets.on_long),
            None => Some(id),
        }
    }
}

// Standby has no deadline; its forced-return target never fires.

/// Regulated heating at the preset setpoint, with low-power idling and
/// automatic switch-off.
#[derive(Default)]
pub struct Work {
    /// Setpoint currently lowered to the low-power temperature.
    lowered: bool,
    /// On-target beep already given for this entry.
    beeped: bool,
    /// Last gesture or mode entry, for the auto-off deadline.
    last_event_ms: u32,
}

impl Work {
    /// Switch the element on at the preset setpoint.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.lowered = false;
        self.beeped = false;
        self.last_event_ms = core.clock.now_ms();

        let target = core.cfg.internal_for(core.cfg.preset_celsius());
        with_iron(core.iron, |iron| {
            iron.set_target(target);
            iron.switch_power(true);
        });
        info!("heating to {}", target);
    }

    /// Milliseconds without operator activity, counting mode entry, gestures
    /// and handle motion.
    fn idle_ms<S: Storage>(&self, core: &Core<'_, S>) -> u32 {
        let now = core.clock.now_ms();
        let since_event = now.saturating_sub(self.last_event_ms);
        let since_motion = with_iron(core.iron, |iron| iron.idle_for_ms(now));
        since_event.min(since_motion)
    }

    /// Live setpoint adjustment, low-power idling and the on-target beep.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if event.is_some() {
            self.last_event_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::Rotate(detents)) => {
                let preset = adjusted_preset(core, detents);
                core.cfg.set_preset_celsius(preset);
                self.lowered = false;
                self.beeped = false;
                let target = core.cfg.internal_for(preset);
                with_iron(core.iron, |iron| iron.set_target(target));
                Some(id)
            }
            Some(Event::ShortPress) => {
                if core.cfg.save().is_err() {
                    warn!("preset not persisted");
                }
                Some(targets.on_short)
            }
            Some(Event::LongPress) => Some(targets.on_long),
            None => {
                self.run_low_power(core);
                let on_target = with_iron(core.iron, |iron| iron.is_on_target());
                if on_target && !self.beeped {
                    core.buzzer.short_beep();
                    self.beeped = true;
                }
                Some(id)
            }
        }
    }

    /// Drop the setpoint to the low-power temperature after the configured
    /// idle time, restore it on motion.
    fn run_low_power<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        let low_temp = core.cfg.low_power_threshold();
        if low_temp == 0 {
            return;
        }
        let timeout_ms = core.cfg.low_power_timeout() as u32 * 1_000;
        let idle = self.idle_ms(core);

        if !self.lowered && idle >= timeout_ms {
            let target = core.cfg.internal_for(low_temp);
            with_iron(core.iron, |iron| iron.set_target(target));
            self.lowered = true;
            info!("low-power setpoint applied");
        } else if self.lowered && idle < timeout_ms {
            let target = core.cfg.internal_for(core.cfg.preset_celsius());
            with_iron(core.iron, |iron| iron.set_target(target));
            self.lowered = false;
            self.beeped = false;
            info!("working setpoint restored");
        }
    }

    /// Automatic switch-off after the configured idle time.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        let timeout_min = core.cfg.off_timeout();
        if timeout_min == 0 {
            return None;
        }
        (self.idle_ms(core) >= timeout_min as u32 * 60_000).then(|| {
            info!("auto-off");
            targets.on_return
        })
    }
}

/// Temporarily raised setpoint with a deadline; any press ends it early.
#[derive(Default)]
pub struct Boost {
    deadline_ms: u32,
}

impl Boost {
    /// Raise the setpoint and arm the deadline.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        let boost = core.cfg.boost();
        let raised = core
            .cfg
            .preset_celsius()
            .saturating_add(boost.increment_celsius())
            .min(TEMP_MAX_C);
        let target = core.cfg.internal_for(raised);
        with_iron(core.iron, |iron| {
            iron.set_target(target);
            iron.switch_power(true);
        });
        self.deadline_ms = core.clock.now_ms() + boost.duration_secs() as u32 * 1_000;
        info!("boost to {} for {} s", raised, boost.duration_secs());
    }

    /// Any press ends the boost early.
    pub fn step(&mut self, id: ModeId, targets: Targets, event: Option<Event>) -> Option<ModeId> {
        match event {
            Some(Event::ShortPress) | Some(Event::LongPress) => Some(targets.on_short),
            _ => Some(id),
        }
    }

    /// Return to heating when the boost duration has elapsed.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        (core.clock.now_ms() >= self.deadline_ms).then_some(targets.on_return)
    }
}

/// One consistent view of the raw state, for the diagnostics display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebugSnapshot {
    /// Last averaged temperature reading, internal units.
    pub temp: u16,
    /// Last averaged ambient reading, raw counts.
    pub ambient_raw: u16,
    /// Ambient temperature, °C.
    pub ambient_celsius: i8,
    /// Commanded duty.
    pub duty: u16,
    /// Whether an element is detected.
    pub connected: bool,
}

/// Raw-reading diagnostics; the element stays off.
#[derive(Default)]
pub struct DebugMode;

impl DebugMode {
    /// Nothing to set up; the readings are live anyway.
    pub fn init<S: Storage>(&mut self, _core: &mut Core<'_, S>) {}

    /// Presses leave.
    pub fn step(&mut self, id: ModeId, targets: Targets, event: Option<Event>) -> Option<ModeId> {
        match event {
            Some(Event::ShortPress) => Some(targets.on_short),
            Some(Event::LongPress) => Some(targets.on_long),
            _ => Some(id),
        }
    }

    /// The current raw readings.
    pub fn snapshot<S: Storage>(core: &Core<'_, S>) -> DebugSnapshot {
        with_iron(core.iron, |iron| DebugSnapshot {
            temp: iron.last_temp(),
            ambient_raw: iron.ambient_raw(),
            ambient_celsius: iron.ambient_celsius(),
            duty: core.duty.get(),
            connected: iron.is_connected(),
        })
    }
}
