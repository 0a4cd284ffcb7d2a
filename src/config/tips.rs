//! The static library of tips the station supports.
//!
//! Calibration records reference tips by their name suffix; this table fixes
//! the set of supported tips and therefore the size of the tip-table region
//! in storage.

/// Display prefix for every tip name, e.g. `T12-` + `JL02` = `T12-JL02`.
pub const TIP_PREFIX: &str = "T12-";

/// Name suffixes of all supported tips, in library order.
///
/// The index into this table is the tip index used everywhere in the core
/// and persisted in the configuration record.
pub const TIPS: &[&str] = &[
    "BC1", "BC2", "BC3", "BL", "D08", "D12", "D24", "ILS", "JL02", "K", "KR", "KU",
];

/// Number of tips a station can support.
pub const TIP_COUNT: usize = TIPS.len();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::records::TIP_NAME_SZ;

    #[test]
    fn suffixes_fit_the_record_layout() {
        for name in TIPS {
            assert!(name.len() <= TIP_NAME_SZ, "{name} does not fit");
            assert!(name.is_ascii());
        }
    }

    #[test]
    fn suffixes_are_unique() {
        for (i, a) in TIPS.iter().enumerate() {
            assert!(!TIPS[i + 1..].contains(a), "duplicate tip {a}");
        }
    }
}
