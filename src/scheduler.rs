//! The mode scheduler: picks the boot mode from the configuration status
//! and drives the active mode, enforcing the one safety rule of the
//! station: every transition cuts element power and zeroes the commanded
//! duty before the next mode runs its entry action.


use crate::config::CfgStatus;
use crate::config::storage::Storage;
use crate::iron::with_iron;
use crate::mode::{ModeGraph, ModeId, Modes};
use crate::{Core, Event};

/// Blocking settle time after the initial mode entry, letting supplies and
/// the analog front end stabilize before regulation output is trusted.
pub const SETTLE_DELAY_MS: u32 = 500;

/// The one diagnostic that reaches the operator.
const READ_ERROR_MSG: &str = "EEPROM read error";

/// The mode scheduler.
pub struct Scheduler {
    graph: ModeGraph,
    modes: Modes,
    active: ModeId,
}

impl Scheduler {
    /// A scheduler over the standard wiring, not yet started.
    pub fn new() -> Self {
        Self {
            graph: ModeGraph::standard(),
            modes: Modes::new(),
            active: ModeId::Standby,
        }
    }

    /// The active mode.
    pub fn active(&self) -> ModeId {
        self.active
    }

    /// The navigation table.
    pub fn graph(&self) -> &ModeGraph {
        &self.graph
    }

    /// Mode state, for display projections.
    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    /// Enter the boot mode for the given configuration status and block for
    /// the settle delay.
    ///
    /// An unreadable configuration shows the fixed diagnostic once and locks
    /// the graph before entering the fail mode, so no gesture sequence leads
    /// back out.
    pub fn start<S: Storage>(&mut self, core: &mut Core<'_, S>, status: CfgStatus) {
        let initial = match status {
            CfgStatus::Ok => ModeId::Standby,
            CfgStatus::NoTip => ModeId::TipActivate,
            CfgStatus::ReadError => {
                core.panel.show_error(READ_ERROR_MSG);
                self.graph.lock_fail();
                ModeId::Fail
            }
        };
        info!("starting in {}", initial);
        self.enter(core, initial);
        core.delay.delay_ms(SETTLE_DELAY_MS);
    }

    /// Run one scheduler step: tilt-switch polling, the forced-return check
    /// and then the active mode's own step.
    ///
    /// A firing forced return transitions immediately; the mode does not
    /// also step within the same tick.
    pub fn tick<S: Storage>(&mut self, core: &mut Core<'_, S>, event: Option<Event>) {
        if core.cfg.low_power_threshold() > 0 {
            let active = core.sensor.is_active();
            let now = core.clock.now_ms();
            with_iron(core.iron, |iron| iron.check_switch_status(active, now));
        }

        if let Some(target) = self.modes.forced_return(self.active, core, &self.graph) {
            if target != self.active {
                self.enter(core, target);
                return;
            }
        }

        match self.modes.step(self.active, core, &self.graph, event) {
            Some(next) if next != self.active => self.enter(core, next),
            Some(_) => {}
            None => {
                warn!("mode {} lost its successor", self.active);
                self.enter(core, ModeId::Fail);
            }
        }
    }

    /// Switch to `next`: power off, duty zero, then the entry action.
    fn enter<S: Storage>(&mut self, core: &mut Core<'_, S>, next: ModeId) {
        with_iron(core.iron, |iron| iron.switch_power(false));
        core.duty.clear();
        debug!("mode {} -> {}", self.active, next);
        self.active = next;
        self.modes.init(next, core);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
