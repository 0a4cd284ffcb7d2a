//! The configuration store: the persisted configuration record, the per-tip
//! calibration records and the derived tip table.
//!
//! `Config` exclusively owns the storage backend; the rest of the core sees
//! read projections and narrow setters. Every write re-encodes the record
//! with a fresh checksum and commits it as one aligned record, and every
//! read re-validates the checksum before the record is trusted.

pub mod records;
pub mod storage;
pub mod tips;

use crate::config::records::{
    CONFIG_SIZE, BoostSettings, CFG_BUZZER, CFG_CELSIUS, CFG_SWITCH, ConfigRecord, RecordError,
    REFERENCE_POINTS, TIP_ACTIVE, TIP_CALIBRATED, TIP_RECORD_SIZE, TipListItem, TipRecord,
};
use crate::config::storage::{
    CONFIG_ADDR, Storage, StorageError, TIP_SLOT_COUNT, tip_slot_addr,
};
use crate::config::tips::{TIP_COUNT, TIPS};
use crate::iron::RegulationParams;

/// Startup status of the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CfgStatus {
    /// Configuration and at least one calibrated, active tip are available.
    Ok,
    /// The configuration is valid but no calibrated, active tip exists.
    NoTip,
    /// The configuration record could not be read or validated.
    ReadError,
}

/// Failures of configuration operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CfgError {
    /// The storage backend failed.
    Storage(StorageError),
    /// A persisted record was rejected.
    Record(RecordError),
    /// No free record slot is left in the tip-table region.
    NoSpace,
    /// The tip index is out of range or not usable for the operation.
    BadIndex,
}

impl From<StorageError> for CfgError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<RecordError> for CfgError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}

/// One entry of the derived tip table: where (if anywhere) a tip's
/// calibration lives in storage, and its status bits.
///
/// The table is rebuilt from storage at init and updated on every mutation;
/// it is never persisted itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipTableEntry {
    /// The record slot holding the tip's data, if one exists.
    pub slot: Option<u8>,
    /// Status bits, see [`TIP_ACTIVE`] and [`TIP_CALIBRATED`].
    pub mask: u8,
}

impl TipTableEntry {
    /// Whether the tip can be selected for work: activated and calibrated.
    pub fn is_usable(&self) -> bool {
        self.mask & (TIP_ACTIVE | TIP_CALIBRATED) == TIP_ACTIVE | TIP_CALIBRATED
    }
}

/// The configuration store.
pub struct Config<S: Storage> {
    /// The storage backend.
    storage: S,
    /// The decoded configuration record.
    record: ConfigRecord,
    /// The derived tip table, one entry per library tip.
    table: [TipTableEntry; TIP_COUNT],
    /// Cached calibration of the active tip.
    active_rec: TipRecord,
}

impl<S: Storage> Config<S> {
    /// A store over the given backend, with defaults until [`Config::init`]
    /// runs.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            record: ConfigRecord::default(),
            table: [TipTableEntry::default(); TIP_COUNT],
            active_rec: TipRecord::uncalibrated(TIPS[0]),
        }
    }

    /// Read and validate the configuration record, rebuild the tip table and
    /// check that a calibrated, active tip exists.
    pub fn init(&mut self) -> CfgStatus {
        let mut raw = [0u8; CONFIG_SIZE];
        if self.storage.read(CONFIG_ADDR, &mut raw).is_err() {
            warn!("config record unreadable");
            return CfgStatus::ReadError;
        }
        match ConfigRecord::decode(&raw) {
            Ok(record) => self.record = record,
            Err(err) => {
                warn!("config record rejected: {}", err);
                return CfgStatus::ReadError;
            }
        }

        if self.build_tip_table().is_err() {
            warn!("tip table region unreadable");
            return CfgStatus::ReadError;
        }

        let configured = self.record.tip as usize;
        let chosen = if configured < TIP_COUNT && self.table[configured].is_usable() {
            Some(configured)
        } else {
            // The configured tip is gone; fall back to any usable one.
            self.table.iter().position(TipTableEntry::is_usable)
        };

        match chosen {
            Some(index) => {
                self.record.tip = index as u8;
                match self.read_tip(index as u8) {
                    Ok(record) => self.active_rec = record,
                    Err(_) => return CfgStatus::ReadError,
                }
                CfgStatus::Ok
            }
            None => {
                let fallback = configured.min(TIP_COUNT - 1);
                self.active_rec = TipRecord::uncalibrated(TIPS[fallback]);
                CfgStatus::NoTip
            }
        }
    }

    /// Scan all record slots and rebuild the derived tip table.
    ///
    /// Storage failures abort the scan; individual invalid records are
    /// simply absent from the table (the tip reads as uncalibrated).
    fn build_tip_table(&mut self) -> Result<(), CfgError> {
        self.table = [TipTableEntry::default(); TIP_COUNT];
        for slot in 0..TIP_SLOT_COUNT as u8 {
            let mut raw = [0u8; TIP_RECORD_SIZE];
            self.storage.read(tip_slot_addr(slot), &mut raw)?;
            let Ok(record) = TipRecord::decode(&raw) else {
                continue;
            };
            if record.mask == 0 {
                continue;
            }
            if let Some(index) = TIPS.iter().position(|name| *name == record.name()) {
                self.table[index] = TipTableEntry {
                    slot: Some(slot),
                    mask: record.mask,
                };
            }
        }
        Ok(())
    }

    /// The calibration record of a tip: its stored record, or an
    /// uncalibrated default when none exists.
    pub fn read_tip(&mut self, index: u8) -> Result<TipRecord, CfgError> {
        let entry = *self
            .table
            .get(index as usize)
            .ok_or(CfgError::BadIndex)?;
        match entry.slot {
            Some(slot) => {
                let mut raw = [0u8; TIP_RECORD_SIZE];
                self.storage.read(tip_slot_addr(slot), &mut raw)?;
                Ok(TipRecord::decode(&raw)?)
            }
            None => Ok(TipRecord::uncalibrated(TIPS[index as usize])),
        }
    }

    /// The slot a tip's record occupies, allocating a free one if needed.
    fn slot_for(&mut self, index: usize) -> Result<u8, CfgError> {
        if let Some(slot) = self.table[index].slot {
            return Ok(slot);
        }
        for slot in 0..TIP_SLOT_COUNT as u8 {
            if !self.table.iter().any(|entry| entry.slot == Some(slot)) {
                return Ok(slot);
            }
        }
        Err(CfgError::NoSpace)
    }

    /// Store a new calibration for a tip and update the derived table.
    pub fn record_calibration(&mut self, index: u8, record: TipRecord) -> Result<(), CfgError> {
        let tip = index as usize;
        if tip >= TIP_COUNT || record.name() != TIPS[tip] {
            return Err(CfgError::BadIndex);
        }
        let points = record.points();
        if !points.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(CfgError::Record(RecordError::BadField));
        }

        let mut record = record;
        record.mask |= TIP_ACTIVE | TIP_CALIBRATED;

        let slot = self.slot_for(tip)?;
        self.storage.write(tip_slot_addr(slot), &record.encode())?;
        self.table[tip] = TipTableEntry {
            slot: Some(slot),
            mask: record.mask,
        };
        if self.record.tip == index {
            self.active_rec = record;
        }
        info!("tip {} calibrated", index);
        Ok(())
    }

    /// Flip a tip's active bit, creating an uncalibrated record when the tip
    /// never had one. Returns the new active state.
    pub fn toggle_tip_active(&mut self, index: u8) -> Result<bool, CfgError> {
        if index as usize >= TIP_COUNT {
            return Err(CfgError::BadIndex);
        }
        let fresh = self.table[index as usize].slot.is_none();
        let mut record = self.read_tip(index)?;
        if !fresh {
            // A tip without a record materializes active; an existing one
            // flips its bit.
            record.mask ^= TIP_ACTIVE;
        }

        let slot = self.slot_for(index as usize)?;
        self.storage.write(tip_slot_addr(slot), &record.encode())?;
        self.table[index as usize] = TipTableEntry {
            slot: Some(slot),
            mask: record.mask,
        };
        Ok(record.is_active())
    }

    /// Make a calibrated, active tip the working tip and persist the choice.
    pub fn set_active_tip(&mut self, index: u8) -> Result<(), CfgError> {
        let tip = index as usize;
        if tip >= TIP_COUNT || !self.table[tip].is_usable() {
            return Err(CfgError::BadIndex);
        }
        self.record.tip = index;
        self.active_rec = self.read_tip(index)?;
        self.save()
    }

    /// Persist the configuration record, recomputing its checksum.
    pub fn save(&mut self) -> Result<(), CfgError> {
        self.storage
            .write(CONFIG_ADDR, &self.record.encode())?;
        debug!("config saved");
        Ok(())
    }

    /// The regulation-loop coefficients.
    pub fn regulation_params(&self) -> RegulationParams {
        self.record.params
    }

    /// Stage new regulation-loop coefficients (persisted on the next save).
    pub fn set_regulation_params(&mut self, params: RegulationParams) {
        self.record.params = params;
    }

    /// Whether audible feedback is enabled.
    pub fn is_buzzer_enabled(&self) -> bool {
        self.record.bit_mask & CFG_BUZZER != 0
    }

    /// Whether temperatures are presented in Celsius.
    pub fn is_celsius(&self) -> bool {
        self.record.bit_mask & CFG_CELSIUS != 0
    }

    /// Whether the handle tilt switch is enabled.
    pub fn is_switch_enabled(&self) -> bool {
        self.record.bit_mask & CFG_SWITCH != 0
    }

    /// The low-power temperature; 0 disables idle detection.
    pub fn low_power_threshold(&self) -> u16 {
        self.record.low_temp
    }

    /// The low-power timeout in seconds.
    pub fn low_power_timeout(&self) -> u8 {
        self.record.low_to
    }

    /// The automatic switch-off timeout in minutes; 0 disables it.
    pub fn off_timeout(&self) -> u8 {
        self.record.off_timeout
    }

    /// The packed boost parameters.
    pub fn boost(&self) -> BoostSettings {
        self.record.boost
    }

    /// Stage new boost parameters (persisted on the next save).
    pub fn set_boost(&mut self, boost: BoostSettings) {
        self.record.boost = boost;
    }

    /// The preset temperature in °C, converting when the station is
    /// configured for Fahrenheit.
    pub fn preset_celsius(&self) -> u16 {
        if self.is_celsius() {
            self.record.temp
        } else {
            (self.record.temp.saturating_sub(32)) * 5 / 9
        }
    }

    /// Stage a new preset temperature, given in °C and clamped to the
    /// working range.
    pub fn set_preset_celsius(&mut self, deg_c: u16) {
        let deg_c = deg_c.clamp(TEMP_MIN_C, TEMP_MAX_C);
        self.record.temp = if self.is_celsius() {
            deg_c
        } else {
            deg_c * 9 / 5 + 32
        };
    }

    /// The index of the active tip.
    pub fn active_tip(&self) -> u8 {
        self.record.tip
    }

    /// The cached calibration of the active tip.
    pub fn active_tip_record(&self) -> &TipRecord {
        &self.active_rec
    }

    /// The full display name of a tip.
    pub fn tip_name(&self, index: u8) -> heapless::String<12> {
        let suffix = TIPS.get(index as usize).copied().unwrap_or("?");
        TipListItem::new(index, 0, suffix).name
    }

    /// The presentation list of all library tips with their current status.
    pub fn tip_list(&self) -> heapless::Vec<TipListItem, TIP_COUNT> {
        let mut list = heapless::Vec::new();
        for (index, suffix) in TIPS.iter().enumerate() {
            let _ = list.push(TipListItem::new(
                index as u8,
                self.table[index].mask,
                suffix,
            ));
        }
        list
    }

    /// Convert a Celsius setpoint to internal sensor units through the
    /// active tip's calibration curve (piecewise linear over the four
    /// reference points, extrapolated at the ends).
    pub fn internal_for(&self, deg_c: u16) -> u16 {
        let points = self.active_rec.points();
        let refs = REFERENCE_POINTS;
        let segment = if deg_c <= refs[1] {
            0
        } else if deg_c <= refs[2] {
            1
        } else {
            2
        };
        let (x0, x1) = (refs[segment] as i32, refs[segment + 1] as i32);
        let (y0, y1) = (points[segment] as i32, points[segment + 1] as i32);
        let value = y0 + (deg_c as i32 - x0) * (y1 - y0) / (x1 - x0);
        value.clamp(0, 4095) as u16
    }
}

/// Lower bound of the operator-settable temperature range, °C.
pub const TEMP_MIN_C: u16 = 100;
/// Upper bound of the operator-settable temperature range, °C.
pub const TEMP_MAX_C: u16 = 450;
