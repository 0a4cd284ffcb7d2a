//! The menu-style modes: item menus, tip selection and activation, boost
//! editing and the info page.
//!
//! All of them share the same shape: a cursor, gesture handling and a 30 s
//! inactivity forced return.

use heapless::Vec;

use crate::config::records::{BoostSettings, TIP_ACTIVE, TIP_CALIBRATED, TipListItem};
use crate::config::storage::Storage;
use crate::config::tips::TIP_COUNT;
use crate::mode::{MENU_TIMEOUT_MS, ModeId, Targets};
use crate::{Core, Event};

fn moved_cursor(cursor: usize, detents: i16, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as i32;
    (cursor as i32 + detents as i32).rem_euclid(len) as usize
}

/// One entry of a static item menu.
pub struct MenuItem {
    /// The mode a short press enters.
    pub target: ModeId,
    /// The display label.
    pub label: &'static str,
}

/// Items of the top-level menu.
pub static MAIN_MENU_ITEMS: &[MenuItem] = &[
    MenuItem {
        target: ModeId::TipSelect,
        label: "select tip",
    },
    MenuItem {
        target: ModeId::BoostSetup,
        label: "boost setup",
    },
    MenuItem {
        target: ModeId::CalibMenu,
        label: "calibrate tip",
    },
    MenuItem {
        target: ModeId::TipActivate,
        label: "activate tips",
    },
    MenuItem {
        target: ModeId::Tune,
        label: "tune",
    },
    MenuItem {
        target: ModeId::PidTune,
        label: "tune PID",
    },
    MenuItem {
        target: ModeId::AutoPidTune,
        label: "auto PID",
    },
    MenuItem {
        target: ModeId::About,
        label: "about",
    },
];

/// Items of the calibration menu.
pub static CALIB_MENU_ITEMS: &[MenuItem] = &[
    MenuItem {
        target: ModeId::CalibAuto,
        label: "automatic",
    },
    MenuItem {
        target: ModeId::CalibManual,
        label: "manual",
    },
];

/// A static item menu: rotate selects, short enters, long leaves.
pub struct Menu {
    items: &'static [MenuItem],
    cursor: usize,
    last_activity_ms: u32,
}

impl Menu {
    /// A menu over the given items.
    pub const fn new(items: &'static [MenuItem]) -> Self {
        Self {
            items,
            cursor: 0,
            last_activity_ms: 0,
        }
    }

    /// Reset the cursor and the inactivity deadline.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.cursor = 0;
        self.last_activity_ms = core.clock.now_ms();
    }

    /// Handle one gesture.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if event.is_some() {
            self.last_activity_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::Rotate(detents)) => {
                self.cursor = moved_cursor(self.cursor, detents, self.items.len());
                Some(id)
            }
            Some(Event::ShortPress) => Some(self.items[self.cursor].target),
            Some(Event::LongPress) => Some(targets.on_long),
            None => Some(id),
        }
    }

    /// Leave after 30 s without a gesture.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        inactivity_return(core, self.last_activity_ms, targets)
    }

    /// The item under the cursor.
    pub fn selected(&self) -> &MenuItem {
        &self.items[self.cursor]
    }
}

fn inactivity_return<S: Storage>(
    core: &Core<'_, S>,
    last_activity_ms: u32,
    targets: Targets,
) -> Option<ModeId> {
    (core.clock.now_ms().saturating_sub(last_activity_ms) >= MENU_TIMEOUT_MS)
        .then_some(targets.on_return)
}

/// Pick the working tip among the calibrated, activated ones.
#[derive(Default)]
pub struct TipSelect {
    items: Vec<TipListItem, TIP_COUNT>,
    cursor: usize,
    last_activity_ms: u32,
}

impl TipSelect {
    /// Collect the selectable tips and put the cursor on the active one.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        let active = core.cfg.active_tip();
        self.items = core
            .cfg
            .tip_list()
            .into_iter()
            .filter(|item| item.mask & (TIP_ACTIVE | TIP_CALIBRATED) == TIP_ACTIVE | TIP_CALIBRATED)
            .collect();
        self.cursor = self
            .items
            .iter()
            .position(|item| item.index == active)
            .unwrap_or(0);
        self.last_activity_ms = core.clock.now_ms();
    }

    /// Handle one gesture; an empty list immediately diverts to tip
    /// activation.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if self.items.is_empty() {
            // Nothing to select from; activation is the short-press target.
            return Some(targets.on_short);
        }
        if event.is_some() {
            self.last_activity_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::Rotate(detents)) => {
                self.cursor = moved_cursor(self.cursor, detents, self.items.len());
                Some(id)
            }
            Some(Event::ShortPress) => {
                let index = self.items[self.cursor].index;
                if core.cfg.set_active_tip(index).is_err() {
                    warn!("tip {} not selectable", index);
                    return Some(id);
                }
                Some(targets.on_return)
            }
            Some(Event::LongPress) => Some(targets.on_long),
            None => Some(id),
        }
    }

    /// Leave after 30 s without a gesture.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        inactivity_return(core, self.last_activity_ms, targets)
    }

    /// The listed tips, for display.
    pub fn items(&self) -> &[TipListItem] {
        &self.items
    }
}

/// Walk the whole tip library and toggle activation bits.
#[derive(Default)]
pub struct TipActivate {
    items: Vec<TipListItem, TIP_COUNT>,
    cursor: usize,
    last_activity_ms: u32,
}

impl TipActivate {
    /// Collect the full library list.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.items = core.cfg.tip_list();
        self.cursor = 0;
        self.last_activity_ms = core.clock.now_ms();
    }

    /// Handle one gesture; a short press toggles and stays.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if event.is_some() {
            self.last_activity_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::Rotate(detents)) => {
                self.cursor = moved_cursor(self.cursor, detents, self.items.len());
                Some(id)
            }
            Some(Event::ShortPress) => {
                let item = &mut self.items[self.cursor];
                match core.cfg.toggle_tip_active(item.index) {
                    Ok(_) => item.mask = core.cfg.tip_list()[item.index as usize].mask,
                    Err(_) => warn!("tip {} not toggled", item.index),
                }
                Some(id)
            }
            Some(Event::LongPress) => Some(targets.on_long),
            None => Some(id),
        }
    }

    /// Leave after 30 s without a gesture.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        inactivity_return(core, self.last_activity_ms, targets)
    }

    /// The listed tips, for display.
    pub fn items(&self) -> &[TipListItem] {
        &self.items
    }
}

/// Edit the packed boost parameters: rotate adjusts the selected field,
/// short toggles between increment and duration, long saves and leaves.
#[derive(Default)]
pub struct BoostSetup {
    editing_duration: bool,
    last_activity_ms: u32,
}

impl BoostSetup {
    /// Start on the increment field.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.editing_duration = false;
        self.last_activity_ms = core.clock.now_ms();
    }

    /// Handle one gesture.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if event.is_some() {
            self.last_activity_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::Rotate(detents)) => {
                let boost = core.cfg.boost();
                let mut increment = boost.increment_index() as i32;
                let mut duration = boost.duration_index() as i32;
                if self.editing_duration {
                    duration = (duration + detents as i32).clamp(0, 15);
                } else {
                    increment = (increment + detents as i32).clamp(0, 15);
                }
                core.cfg
                    .set_boost(BoostSettings::new(increment as u8, duration as u8));
                Some(id)
            }
            Some(Event::ShortPress) => {
                self.editing_duration = !self.editing_duration;
                Some(id)
            }
            Some(Event::LongPress) => {
                if core.cfg.save().is_err() {
                    warn!("boost settings not persisted");
                }
                Some(targets.on_long)
            }
            None => Some(id),
        }
    }

    /// Leave after 30 s without a gesture, discarding nothing (staged values
    /// persist on the next save).
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        inactivity_return(core, self.last_activity_ms, targets)
    }
}

/// Static device information; a long press chains into diagnostics.
#[derive(Default)]
pub struct About {
    last_activity_ms: u32,
}

impl About {
    /// Arm the inactivity deadline.
    pub fn init<S: Storage>(&mut self, core: &mut Core<'_, S>) {
        self.last_activity_ms = core.clock.now_ms();
    }

    /// Handle one gesture.
    pub fn step<S: Storage>(
        &mut self,
        id: ModeId,
        core: &mut Core<'_, S>,
        targets: Targets,
        event: Option<Event>,
    ) -> Option<ModeId> {
        if event.is_some() {
            self.last_activity_ms = core.clock.now_ms();
        }
        match event {
            Some(Event::ShortPress) => Some(targets.on_short),
            Some(Event::LongPress) => Some(targets.on_long),
            _ => Some(id),
        }
    }

    /// Leave after 30 s without a gesture.
    pub fn forced_return<S: Storage>(
        &self,
        core: &Core<'_, S>,
        targets: Targets,
    ) -> Option<ModeId> {
        inactivity_return(core, self.last_activity_ms, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_both_ways() {
        assert_eq!(moved_cursor(0, 1, 3), 1);
        assert_eq!(moved_cursor(2, 1, 3), 0);
        assert_eq!(moved_cursor(0, -1, 3), 2);
        assert_eq!(moved_cursor(0, -7, 3), 2);
        assert_eq!(moved_cursor(0, 1, 0), 0);
    }

    #[test]
    fn menus_reach_every_advertised_mode() {
        let targets: &[ModeId] = &[
            ModeId::TipSelect,
            ModeId::BoostSetup,
            ModeId::CalibMenu,
            ModeId::TipActivate,
            ModeId::Tune,
            ModeId::PidTune,
            ModeId::AutoPidTune,
            ModeId::About,
        ];
        for target in targets {
            assert!(
                MAIN_MENU_ITEMS.iter().any(|item| item.target == *target),
                "missing menu entry"
            );
        }
        assert!(
            CALIB_MENU_ITEMS
                .iter()
                .any(|item| item.target == ModeId::CalibAuto)
        );
        assert!(
            CALIB_MENU_ITEMS
                .iter()
                .any(|item| item.target == ModeId::CalibManual)
        );
    }
}
