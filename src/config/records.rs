//! The fixed-layout persisted records and their integrity checks.
//!
//! Layouts are exact for compatibility with existing station storage: the
//! configuration record is a 32-byte little-endian image aligned to the
//! 32-byte boundary after the tip-table region; tip calibration records are
//! 16 bytes, two per storage chunk. A record is trusted only after its
//! stored checksum matches the recomputed one.

use crc::{CRC_8_SMBUS, CRC_32_CKSUM, Crc};

use crate::config::tips::TIP_PREFIX;
use crate::iron::RegulationParams;

/// Configuration bit-mask: temperature unit is Celsius.
pub const CFG_CELSIUS: u8 = 1 << 0;
/// Configuration bit-mask: buzzer enabled.
pub const CFG_BUZZER: u8 = 1 << 1;
/// Configuration bit-mask: handle tilt switch enabled.
pub const CFG_SWITCH: u8 = 1 << 2;

/// Tip status bit: the tip is activated for use.
pub const TIP_ACTIVE: u8 = 1 << 0;
/// Tip status bit: the tip has a valid calibration.
pub const TIP_CALIBRATED: u8 = 1 << 1;

/// Size of the encoded configuration record.
pub const CONFIG_SIZE: usize = 32;
/// Size of one encoded tip record.
pub const TIP_RECORD_SIZE: usize = 16;
/// Bytes reserved for a tip-name suffix inside a tip record.
pub const TIP_NAME_SZ: usize = 5;

/// The reference temperatures (°C) of the four calibration points.
pub const REFERENCE_POINTS: [u16; 4] = [200, 260, 330, 400];

/// Identifier every valid configuration record carries.
const CONFIG_ID: u32 = 0x5431_3243; // "T12C"

/// Checksum over full configuration records.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_CKSUM);
/// One-byte checksum over tip records.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Reasons a persisted record is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// The stored checksum does not match the recomputed one.
    BadChecksum,
    /// The record identifier is not the expected one.
    BadIdentifier,
    /// A field is outside its documented range.
    BadField,
}

/// The packed boost byte: bits 7–4 hold the temperature-increment index,
/// bits 3–0 the duration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoostSettings(u8);

impl BoostSettings {
    /// Wrap a raw boost byte.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Pack an increment index and a duration index, each masked to 4 bits.
    pub const fn new(increment_index: u8, duration_index: u8) -> Self {
        Self(((increment_index & 0x0f) << 4) | (duration_index & 0x0f))
    }

    /// The raw byte as persisted.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The temperature-increment index `n`, 0–15.
    pub const fn increment_index(self) -> u8 {
        self.0 >> 4
    }

    /// The duration index `m`, 0–15.
    pub const fn duration_index(self) -> u8 {
        self.0 & 0x0f
    }

    /// A zero increment index means the boost feature is disabled.
    pub const fn is_enabled(self) -> bool {
        self.increment_index() != 0
    }

    /// The boost temperature increment in °C: `n × 5`.
    ///
    /// Records written by firmware that used the off-by-one `n × 5 − 1`
    /// table decode 1 °C higher here; see DESIGN.md.
    pub const fn increment_celsius(self) -> u16 {
        self.increment_index() as u16 * 5
    }

    /// The boost duration in seconds: `(m + 1) × 5`.
    pub const fn duration_secs(self) -> u16 {
        (self.duration_index() as u16 + 1) * 5
    }
}

/// The persisted user/device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigRecord {
    /// Record identifier.
    pub id: u32,
    /// Regulation-loop coefficients.
    pub params: RegulationParams,
    /// The preset temperature, in the configured unit.
    pub temp: u16,
    /// Index of the active tip in the tip library.
    pub tip: u8,
    /// Automatic switch-off timeout in minutes, 0–30.
    pub off_timeout: u8,
    /// Low-power temperature; 0 disables idle detection.
    pub low_temp: u16,
    /// Low-power timeout in seconds.
    pub low_to: u8,
    /// See the `CFG_*` bit-mask constants.
    pub bit_mask: u8,
    /// Packed boost parameters.
    pub boost: BoostSettings,
    /// Screen-saver timeout in minutes, 0–60; 0 disables it.
    pub scr_save_timeout: u8,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            id: CONFIG_ID,
            params: RegulationParams {
                kp: 3000,
                ki: 60,
                kd: 500,
            },
            temp: 320,
            tip: 0,
            off_timeout: 10,
            low_temp: 0,
            low_to: 5,
            bit_mask: CFG_CELSIUS | CFG_BUZZER,
            boost: BoostSettings::default(),
            scr_save_timeout: 0,
        }
    }
}

impl ConfigRecord {
    /// Encode to the persisted 32-byte image, checksum included.
    pub fn encode(&self) -> [u8; CONFIG_SIZE] {
        let mut raw = [0u8; CONFIG_SIZE];
        raw[0..4].copy_from_slice(&self.id.to_le_bytes());
        // raw[4..8] is the checksum, zero while it is computed.
        raw[8..12].copy_from_slice(&self.params.kp.to_le_bytes());
        raw[12..16].copy_from_slice(&self.params.ki.to_le_bytes());
        raw[16..20].copy_from_slice(&self.params.kd.to_le_bytes());
        raw[20..22].copy_from_slice(&self.temp.to_le_bytes());
        raw[22] = self.tip;
        raw[23] = self.off_timeout;
        raw[24..26].copy_from_slice(&self.low_temp.to_le_bytes());
        raw[26] = self.low_to;
        raw[27] = self.bit_mask;
        raw[28] = self.boost.raw();
        raw[29] = self.scr_save_timeout;

        let crc = CRC32.checksum(&raw);
        raw[4..8].copy_from_slice(&crc.to_le_bytes());
        raw
    }

    /// Decode a persisted image, rejecting it on checksum, identifier or
    /// range violations.
    pub fn decode(raw: &[u8; CONFIG_SIZE]) -> Result<Self, RecordError> {
        let stored = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let mut scratch = *raw;
        scratch[4..8].fill(0);
        if CRC32.checksum(&scratch) != stored {
            return Err(RecordError::BadChecksum);
        }

        let id = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if id != CONFIG_ID {
            return Err(RecordError::BadIdentifier);
        }

        let record = Self {
            id,
            params: RegulationParams {
                kp: i32::from_le_bytes(raw[8..12].try_into().unwrap()),
                ki: i32::from_le_bytes(raw[12..16].try_into().unwrap()),
                kd: i32::from_le_bytes(raw[16..20].try_into().unwrap()),
            },
            temp: u16::from_le_bytes(raw[20..22].try_into().unwrap()),
            tip: raw[22],
            off_timeout: raw[23],
            low_temp: u16::from_le_bytes(raw[24..26].try_into().unwrap()),
            low_to: raw[26],
            bit_mask: raw[27],
            boost: BoostSettings::from_raw(raw[28]),
            scr_save_timeout: raw[29],
        };

        if record.off_timeout > 30 || record.scr_save_timeout > 60 {
            return Err(RecordError::BadField);
        }
        Ok(record)
    }
}

/// Internal readings of the factory-default calibration curve at the four
/// reference points, used until a tip has its own calibration.
pub const DEFAULT_CURVE: [u16; 4] = [1700, 2150, 2700, 3300];

/// Per-tip calibration, persisted as a 16-byte record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipRecord {
    /// Internal reading at 200 °C.
    pub t200: u16,
    /// Internal reading at 260 °C.
    pub t260: u16,
    /// Internal reading at 330 °C.
    pub t330: u16,
    /// Internal reading at 400 °C.
    pub t400: u16,
    /// Status bits, see [`TIP_ACTIVE`] and [`TIP_CALIBRATED`].
    pub mask: u8,
    /// The name suffix, NUL padded.
    name: [u8; TIP_NAME_SZ],
    /// Ambient temperature (°C) recorded when the tip was calibrated.
    pub ambient: i8,
}

impl TipRecord {
    /// A record for a tip that was activated but never calibrated: active
    /// bit set, calibrated bit clear, factory-default curve.
    pub fn uncalibrated(name: &str) -> Self {
        Self {
            t200: DEFAULT_CURVE[0],
            t260: DEFAULT_CURVE[1],
            t330: DEFAULT_CURVE[2],
            t400: DEFAULT_CURVE[3],
            mask: TIP_ACTIVE,
            name: Self::pack_name(name),
            ambient: 0,
        }
    }

    /// A calibrated record from four captured reference readings.
    pub fn calibrated(name: &str, points: [u16; 4], ambient: i8) -> Self {
        Self {
            t200: points[0],
            t260: points[1],
            t330: points[2],
            t400: points[3],
            mask: TIP_ACTIVE | TIP_CALIBRATED,
            name: Self::pack_name(name),
            ambient,
        }
    }

    fn pack_name(name: &str) -> [u8; TIP_NAME_SZ] {
        let mut packed = [0u8; TIP_NAME_SZ];
        let bytes = name.as_bytes();
        let len = bytes.len().min(TIP_NAME_SZ);
        packed[..len].copy_from_slice(&bytes[..len]);
        packed
    }

    /// The name suffix, without NUL padding.
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TIP_NAME_SZ);
        // Packed from &str, so this cannot fail on our own records; reject
        // garbage from storage gracefully.
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Whether the tip is activated for use.
    pub fn is_active(&self) -> bool {
        self.mask & TIP_ACTIVE != 0
    }

    /// Whether the tip carries a valid calibration.
    pub fn is_calibrated(&self) -> bool {
        self.mask & TIP_CALIBRATED != 0
    }

    /// The four reference readings in point order.
    pub fn points(&self) -> [u16; 4] {
        [self.t200, self.t260, self.t330, self.t400]
    }

    /// Encode to the persisted 16-byte image, checksum included.
    pub fn encode(&self) -> [u8; TIP_RECORD_SIZE] {
        let mut raw = [0u8; TIP_RECORD_SIZE];
        raw[0..2].copy_from_slice(&self.t200.to_le_bytes());
        raw[2..4].copy_from_slice(&self.t260.to_le_bytes());
        raw[4..6].copy_from_slice(&self.t330.to_le_bytes());
        raw[6..8].copy_from_slice(&self.t400.to_le_bytes());
        raw[8] = self.mask;
        raw[9..9 + TIP_NAME_SZ].copy_from_slice(&self.name);
        raw[14] = self.ambient as u8;
        raw[15] = CRC8.checksum(&raw[..15]);
        raw
    }

    /// Decode a persisted image, rejecting it on a checksum mismatch.
    pub fn decode(raw: &[u8; TIP_RECORD_SIZE]) -> Result<Self, RecordError> {
        if CRC8.checksum(&raw[..15]) != raw[15] {
            return Err(RecordError::BadChecksum);
        }
        let mut name = [0u8; TIP_NAME_SZ];
        name.copy_from_slice(&raw[9..9 + TIP_NAME_SZ]);
        Ok(Self {
            t200: u16::from_le_bytes(raw[0..2].try_into().unwrap()),
            t260: u16::from_le_bytes(raw[2..4].try_into().unwrap()),
            t330: u16::from_le_bytes(raw[4..6].try_into().unwrap()),
            t400: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            mask: raw[8],
            name,
            ambient: raw[14] as i8,
        })
    }
}

/// A presentation-only projection of one tip, for the selection and
/// activation lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipListItem {
    /// Index of the tip in the library.
    pub index: u8,
    /// Status bits, see [`TIP_ACTIVE`] and [`TIP_CALIBRATED`].
    pub mask: u8,
    /// The complete display name, e.g. `T12-JL02`.
    pub name: heapless::String<12>,
}

impl TipListItem {
    /// Build the projection for the given library entry.
    pub fn new(index: u8, mask: u8, suffix: &str) -> Self {
        let mut name = heapless::String::new();
        let _ = name.push_str(TIP_PREFIX);
        let _ = name.push_str(suffix);
        Self { index, mask, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_record_layout_is_stable() {
        let record = ConfigRecord {
            temp: 0x0201,
            tip: 7,
            off_timeout: 30,
            low_temp: 0x0403,
            low_to: 9,
            bit_mask: CFG_CELSIUS | CFG_SWITCH,
            boost: BoostSettings::new(3, 2),
            scr_save_timeout: 60,
            params: RegulationParams {
                kp: 1,
                ki: -2,
                kd: 3,
            },
            ..ConfigRecord::default()
        };
        let raw = record.encode();

        assert_eq!(&raw[0..4], &CONFIG_ID.to_le_bytes());
        assert_eq!(&raw[8..12], &1i32.to_le_bytes());
        assert_eq!(&raw[12..16], &(-2i32).to_le_bytes());
        assert_eq!(&raw[16..20], &3i32.to_le_bytes());
        assert_eq!(&raw[20..22], &[0x01, 0x02]);
        assert_eq!(raw[22], 7);
        assert_eq!(raw[23], 30);
        assert_eq!(&raw[24..26], &[0x03, 0x04]);
        assert_eq!(raw[26], 9);
        assert_eq!(raw[27], CFG_CELSIUS | CFG_SWITCH);
        assert_eq!(raw[28], 0x32);
        assert_eq!(raw[29], 60);
        assert_eq!(&raw[30..32], &[0, 0]);

        assert_eq!(ConfigRecord::decode(&raw).unwrap(), record);
    }

    #[test]
    fn config_record_rejects_corruption() {
        let mut raw = ConfigRecord::default().encode();
        raw[20] ^= 0x01;
        assert_eq!(
            ConfigRecord::decode(&raw),
            Err(RecordError::BadChecksum)
        );
    }

    #[test]
    fn config_record_rejects_a_blank_image() {
        let raw = [0u8; CONFIG_SIZE];
        assert_eq!(
            ConfigRecord::decode(&raw),
            Err(RecordError::BadChecksum)
        );
    }

    #[test]
    fn config_record_rejects_out_of_range_fields() {
        let mut record = ConfigRecord::default();
        record.off_timeout = 31;
        let raw = record.encode();
        assert_eq!(ConfigRecord::decode(&raw), Err(RecordError::BadField));
    }

    #[test]
    fn boost_byte_round_trips_every_pair() {
        for n in 0..16u8 {
            for m in 0..16u8 {
                let boost = BoostSettings::new(n, m);
                assert_eq!(boost.increment_index(), n);
                assert_eq!(boost.duration_index(), m);
                assert_eq!(boost.duration_secs(), (m as u16 + 1) * 5);
                assert_eq!(boost.increment_celsius(), n as u16 * 5);
                assert_eq!(BoostSettings::from_raw(boost.raw()), boost);
            }
        }
    }

    #[test]
    fn boost_nibble_positions() {
        let boost = BoostSettings::new(0x0a, 0x03);
        assert_eq!(boost.raw(), 0xa3);
        assert!(boost.is_enabled());
        assert!(!BoostSettings::new(0, 5).is_enabled());
    }

    #[test]
    fn tip_record_round_trip() {
        let record = TipRecord::calibrated("JL02", [1650, 2100, 2650, 3250], 23);
        let raw = record.encode();
        assert_eq!(raw.len(), TIP_RECORD_SIZE);
        assert_eq!(&raw[9..14], b"JL02\0");

        let decoded = TipRecord::decode(&raw).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.name(), "JL02");
        assert!(decoded.is_calibrated());
        assert!(decoded.is_active());
        assert_eq!(decoded.ambient, 23);
    }

    #[test]
    fn tip_record_rejects_corruption() {
        let mut raw = TipRecord::uncalibrated("K").encode();
        raw[0] ^= 0xff;
        assert_eq!(TipRecord::decode(&raw), Err(RecordError::BadChecksum));
    }

    #[test]
    fn uncalibrated_record_has_only_the_active_bit() {
        let record = TipRecord::uncalibrated("BC2");
        assert!(record.is_active());
        assert!(!record.is_calibrated());
        assert_eq!(record.points(), DEFAULT_CURVE);
    }

    #[test]
    fn tip_list_item_carries_the_full_name() {
        let item = TipListItem::new(3, TIP_ACTIVE, "BL");
        assert_eq!(item.name.as_str(), "T12-BL");
    }
}
