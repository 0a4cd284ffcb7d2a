//! Tip calibration: automatic (hold-and-capture) and manual (trim-and-
//! capture) walks over the four reference points.

use crate::config::records::{REFERENCE_POINTS, TipRecord};
use crate::config::storage::Storage;
use crate::config::tips::TIPS;
use crate::iron::with_iron;
use crate::mode::{ModeId, Targets};
use crate::{Core, Event};

/// How long a reading must hold inside the on-target band before it is
/// captured as a reference point.
const POINT_HOLD_MS: u32 = 3_000;

/// Internal units per encoder detent when trimming manually.
const TRIM_PER_DETENT: i32 = 4;

/// Write the captured curve for the active tip.
fn store_calibration<S: Storage>(core: &mut Core<'_, S>, points: [u16; 4]) {
    let index = core.cfg.active_tip();
    let suffix = TIPS[index as usize];
    let ambient = with_iron(core.iron, |iron| iron.ambient_celsius());
    match core
        .cfg
        .record_calibration(index, TipRecord::calibrated(suffix, points, ambient))
    {
        Ok(()) => info!("calibration stored for tip {}", index),
        Err(_) => warn!("calibration rejected for tip {}", index),
    }
}

/// Automatic calibration: regulate to each reference temperature, wait for
/// the reading to hold, capture it.
#[derive(Default)]
pub struct CalibAuto {
    point: usize,
    points: [u16; 4],
    hold_since_ms: Option<u32>,
}

impl CalibAuto {
    fn apply_point<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        let target = core.cfg.internal_for(REFERENCE_POINTS[self.point]);
        with_iron(core.iron, |iron| iron.set_target(target));
        self.hold_since_ms = None;
    }

    /// Start at the first reference point with the element on.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.point = 0;
        self.points = [0; 4];
        self.apply_point(core);
        with_iron(core.iron, |iron| iron.switch_power(true));
    }

    /// Advance the capture sequence; any press aborts without writing.
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

        let now = core.clock.now_ms();
        let (on_target, temp) = with_iron(core.iron, |iron| (iron.is_on_target(), iron.last_temp()));
        if !on_target {
            self.hold_since_ms = None;
            return Some(id);
        }
        match self.hold_since_ms {
            None => self.hold_since_ms = Some(now),
            Some(since) if now.saturating_sub(since) >= POINT_HOLD_MS => {
                self.points[self.point] = temp;
                core.buzzer.short_beep();
                self.point += 1;
                if self.point == REFERENCE_POINTS.len() {
                    store_calibration(core, self.points);
                    return Some(targets.on_return);
                }
                self.apply_point(core);
            }
            Some(_) => {}
        }
        Some(id)
    }
}

/// Manual calibration: the operator trims the setpoint against an external
/// thermometer and captures each point by hand.
#[derive(Default)]
pub struct CalibManual {
    point: usize,
    points: [u16; 4],
    trim: u16,
}

impl CalibManual {
    fn apply_point<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.trim = core.cfg.internal_for(REFERENCE_POINTS[self.point]);
        with_iron(core.iron, |iron| iron.set_target(self.trim));
    }

    /// Start at the first reference point with the element on.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.point = 0;
        self.points = [0; 4];
        self.apply_point(core);
        with_iron(core.iron, |iron| iron.switch_power(true));
    }

    /// Trim, capture and advance; a long press aborts without writing.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        match event {
            Some(Event::Rotate(detents)) => {
                let trimmed = self.trim as i32 + detents as i32 * TRIM_PER_DETENT;
                self.trim = trimmed.clamp(0, 4095) as u16;
                with_iron(core.iron, |iron| iron.set_target(self.trim));
                Some(id)
            }
            Some(Event::ShortPress) => {
                self.points[self.point] = self.trim;
                core.buzzer.short_beep();
                self.point += 1;
                if self.point == REFERENCE_POINTS.len() {
                    store_calibration(core, self.points);
                    return Some(targets.on_return);
                }
                self.apply_point(core);
                Some(id)
            }
            Some(Event::LongPress) => Some(targets.on_return),
            None => Some(id),
        }
    }

    /// The trim value currently applied, for display.
    pub fn trim(&self) -> u16 {
        self.trim
    }
}
