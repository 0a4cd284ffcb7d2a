//! The operating modes and the wiring between them.
//!
//! Navigation is data, not control flow: every mode carries a
//! [`Targets`] entry naming where a forced return, a short press and a long
//! press lead. The table is fully populated by [`ModeGraph::standard`]
//! before the scheduler starts; [`ModeGraph::lock_fail`] rewires the fail
//! mode into a self-loop so a fatal boot error cannot be navigated away
//! from.
//!
//! Every mode implements `init`, `step` and `forced_return`, dispatched by
//! a match over [`ModeId`]. `step` returns the mode to run next (its own id
//! to stay); `None` means the mode lost its footing entirely and the
//! scheduler falls back to [`ModeId::Fail`].

pub mod calibrate;
pub mod menu;
pub mod run;
pub mod tune;

use crate::config::storage::Storage;
use crate::{Core, Event};

/// Inactivity timeout of the menu-style modes.
pub const MENU_TIMEOUT_MS: u32 = 30_000;

/// Identifies one operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ModeId {
    /// Element off, preset adjustable.
    Standby = 0,
    /// Regulated heating at the preset setpoint.
    Work = 1,
    /// Temporarily raised setpoint with a deadline.
    Boost = 2,
    /// Pick the working tip from the calibrated ones.
    TipSelect = 3,
    /// Activate or deactivate library tips.
    TipActivate = 4,
    /// Automatic four-point tip calibration.
    CalibAuto = 5,
    /// Manual four-point tip calibration.
    CalibManual = 6,
    /// Chooses between the calibration procedures.
    CalibMenu = 7,
    /// Constant raw setpoint for hardware trimming.
    Tune = 8,
    /// Terminal error state.
    Fail = 9,
    /// Edit the packed boost parameters.
    BoostSetup = 10,
    /// Manual regulation-coefficient editing.
    PidTune = 11,
    /// Relay-excitation coefficient estimation.
    AutoPidTune = 12,
    /// The top-level menu.
    MainMenu = 13,
    /// Static device information.
    About = 14,
    /// Raw-reading diagnostics.
    Debug = 15,
}

impl ModeId {
    /// Number of modes.
    pub const COUNT: usize = 16;
}

/// The navigation targets of one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Targets {
    /// Where a forced return (timeout, completion) leads.
    pub on_return: ModeId,
    /// Where a short press leads.
    pub on_short: ModeId,
    /// Where a long press leads.
    pub on_long: ModeId,
}

impl Targets {
    const fn new(on_return: ModeId, on_short: ModeId, on_long: ModeId) -> Self {
        Self {
            on_return,
            on_short,
            on_long,
        }
    }
}

/// The complete mode-navigation table.
pub struct ModeGraph {
    targets: [Targets; ModeId::COUNT],
}

impl ModeGraph {
    /// The standard wiring of the station.
    pub fn standard() -> Self {
        use ModeId::*;

        let mut t = [Targets::new(Standby, Standby, Standby); ModeId::COUNT];
        t[Standby as usize] = Targets::new(TipSelect, Work, MainMenu);
        t[Work as usize] = Targets::new(Standby, Standby, Boost);
        t[Boost as usize] = Targets::new(Work, Work, Work);
        t[TipSelect as usize] = Targets::new(Standby, TipActivate, MainMenu);
        t[TipActivate as usize] = Targets::new(Standby, Standby, MainMenu);
        t[CalibManual as usize] = Targets::new(CalibMenu, Standby, Standby);
        t[BoostSetup as usize] = Targets::new(MainMenu, MainMenu, Standby);
        t[AutoPidTune as usize] = Targets::new(Standby, PidTune, Standby);
        t[About as usize] = Targets::new(Standby, Standby, Debug);
        // CalibAuto, CalibMenu, Tune, Fail, PidTune, MainMenu and Debug all
        // lead back to Standby on every gesture.
        Self { targets: t }
    }

    /// The navigation targets of a mode.
    pub fn targets(&self, id: ModeId) -> Targets {
        self.targets[id as usize]
    }

    /// Rewire the fail mode into a self-loop. Irreversible for the lifetime
    /// of the graph.
    pub fn lock_fail(&mut self) {
        self.targets[ModeId::Fail as usize] =
            Targets::new(ModeId::Fail, ModeId::Fail, ModeId::Fail);
    }
}

/// Terminal error state: beeps on entry and follows its wiring, which a
/// locked graph points back at itself.
#[derive(Default)]
struct Fail;

impl Fail {
    fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        core.buzzer.failure_beep();
    }

    fn step(&mut self, id: ModeId, targets: Targets, event: Option<Event>) -> Option<ModeId> {
        match event {
            Some(Event::ShortPress) => Some(targets.on_short),
            Some(Event::LongPress) => Some(targets.on_long),
            _ => Some(id),
        }
    }
}

/// State of every mode, owned by the scheduler.
pub struct Modes {
    standby: run::Standby,
    work: run::Work,
    boost: run::Boost,
    tip_select: menu::TipSelect,
    tip_activate: menu::TipActivate,
    calib_auto: calibrate::CalibAuto,
    calib_manual: calibrate::CalibManual,
    calib_menu: menu::Menu,
    tune: tune::Tune,
    fail: Fail,
    boost_setup: menu::BoostSetup,
    pid_tune: tune::PidTune,
    auto_pid: tune::AutoPidTune,
    main_menu: menu::Menu,
    about: menu::About,
    debug: run::DebugMode,
}

impl Modes {
    /// All modes in their entry state.
    pub fn new() -> Self {
        Self {
            standby: Default::default(),
            work: Default::default(),
            boost: Default::default(),
            tip_select: Default::default(),
            tip_activate: Default::default(),
            calib_auto: Default::default(),
            calib_manual: Default::default(),
            calib_menu: menu::Menu::new(menu::CALIB_MENU_ITEMS),
            tune: Default::default(),
            fail: Fail,
            boost_setup: Default::default(),
            pid_tune: Default::default(),
            auto_pid: Default::default(),
            main_menu: menu::Menu::new(menu::MAIN_MENU_ITEMS),
            about: Default::default(),
            debug: Default::default(),
        }
    }

    /// Run a mode's entry action. The scheduler guarantees the element is
    /// unpowered and the duty cell cleared beforehand.
    pub fn init<S: Storage>(&mut self, id: ModeId, core: &mut Core<'_, S>) {
        match id {
            ModeId::Standby => self.standby.init(core),
            ModeId::Work => self.work.init(core),
            ModeId::Boost => self.boost.init(core),
            ModeId::TipSelect => self.tip_select.init(core),
            ModeId::TipActivate => self.tip_activate.init(core),
            ModeId::CalibAuto => self.calib_auto.init(core),
            ModeId::CalibManual => self.calib_manual.init(core),
            ModeId::CalibMenu => self.calib_menu.init(core),
            ModeId::Tune => self.tune.init(core),
            ModeId::Fail => self.fail.init(core),
            ModeId::BoostSetup => self.boost_setup.init(core),
            ModeId::PidTune => self.pid_tune.init(core),
            ModeId::AutoPidTune => self.auto_pid.init(core),
            ModeId::MainMenu => self.main_menu.init(core),
            ModeId::About => self.about.init(core),
            ModeId::Debug => self.debug.init(core),
        }
    }

    /// Run one scheduler step of a mode.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        graph: &ModeGraph,
        event: Option<Event>,
    ) -> Option<ModeId> {
        let targets = graph.targets(id);
        match id {
            ModeId::Standby => self.standby.step(id, core, targets, event),
            ModeId::Work => self.work.step(id, core, targets, event),
            ModeId::Boost => self.boost.step(id, targets, event),
            ModeId::TipSelect => self.tip_select.step(id, core, targets, event),
            ModeId::TipActivate => self.tip_activate.step(id, core, targets, event),
            ModeId::CalibAuto => self.calib_auto.step(id, core, targets, event),
            ModeId::CalibManual => self.calib_manual.step(id, core, targets, event),
            ModeId::CalibMenu => self.calib_menu.step(id, core, targets, event),
            ModeId::Tune => self.tune.step(id, core, targets, event),
            ModeId::Fail => self.fail.step(id, targets, event),
            ModeId::BoostSetup => self.boost_setup.step(id, core, targets, event),
            ModeId::PidTune => self.pid_tune.step(id, core, targets, event),
            ModeId::AutoPidTune => self.auto_pid.step(id, core, targets, event),
            ModeId::MainMenu => self.main_menu.step(id, core, targets, event),
            ModeId::About => self.about.step(id, core, targets, event),
            ModeId::Debug => self.debug.step(id, targets, event),
        }
    }

    /// The top-level menu, for display.
    pub fn main_menu(&self) -> &menu::Menu {
        &self.main_menu
    }

    /// The calibration menu, for display.
    pub fn calib_menu(&self) -> &menu::Menu {
        &self.calib_menu
    }

    /// The tip-selection list, for display.
    pub fn tip_select(&self) -> &menu::TipSelect {
        &self.tip_select
    }

    /// The tip-activation list, for display.
    pub fn tip_activate(&self) -> &menu::TipActivate {
        &self.tip_activate
    }

    /// The raw tuning setpoint, for display.
    pub fn tune(&self) -> &tune::Tune {
        &self.tune
    }

    /// The coefficient editor, for display.
    pub fn pid_tune(&self) -> &tune::PidTune {
        &self.pid_tune
    }

    /// The manual calibration state, for display.
    pub fn calib_manual(&self) -> &calibrate::CalibManual {
        &self.calib_manual
    }

    /// Check a mode's forced-return deadline.
    pub fn forced_return<S: Storage>(
        &self,
        id: ModeId,
        core: &Core<'_, S>,
        graph: &ModeGraph,
    ) -> Option<ModeId> {
        let targets = graph.targets(id);
        match id {
            ModeId::Work => self.work.forced_return(core, targets),
            ModeId::Boost => self.boost.forced_return(core, targets),
            ModeId::TipSelect => self.tip_select.forced_return(core, targets),
            ModeId::TipActivate => self.tip_activate.forced_return(core, targets),
            ModeId::CalibMenu => self.calib_menu.forced_return(core, targets),
            ModeId::BoostSetup => self.boost_setup.forced_return(core, targets),
            ModeId::MainMenu => self.main_menu.forced_return(core, targets),
            ModeId::About => self.about.forced_return(core, targets),
            _ => None,
        }
    }
}

impl Default for Modes {
    fn default() -> Self {
        Self::new()
    }
}
