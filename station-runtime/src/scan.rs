//! The scanner grammar (§6): classify a raw scanned label into a DUT, a DUT
//! with an option suffix, a PSU label, or unrecognised.

use regex::Regex;
use std::sync::LazyLock;

/// (sn, mn) parsed from a legacy DUT label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DutId {
    pub sn: u64,
    pub mn: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanKind {
    Dut(DutId),
    DutWithOption { id: DutId, option: String },
    Psu { word: String, code: String },
    Unrecognized(String),
}

static DUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[DUT#\|(\d{5}):(\d{8})\]$").expect("valid regex"));
static DUT_WITH_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[DUT\|(\d{5}):(\d{8}):(.{12})\]$").expect("valid regex"));
static PSU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[PSU#\|(\w{4}):(\d{3})-(\d{4})\]$").expect("valid regex"));

/// Classifies `raw` per the fixed scanner grammar in §6. The exact regex
/// dialect is an implementation choice; the label shapes are not.
pub fn classify(raw: &str) -> ScanKind {
    if let Some(caps) = DUT.captures(raw) {
        return ScanKind::Dut(DutId {
            sn: caps[2].parse().expect("8 digits fits in u64"),
            mn: caps[1].parse().expect("5 digits fits in u32"),
        });
    }
    if let Some(caps) = DUT_WITH_OPTION.captures(raw) {
        return ScanKind::DutWithOption {
            id: DutId {
                sn: caps[2].parse().expect("8 digits fits in u64"),
                mn: caps[1].parse().expect("5 digits fits in u32"),
            },
            option: caps[3].to_string(),
        };
    }
    if let Some(caps) = PSU.captures(raw) {
        return ScanKind::Psu {
            word: caps[1].to_string(),
            code: format!("{}-{}", &caps[2], &caps[3]),
        };
    }
    ScanKind::Unrecognized(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_legacy_dut_label() {
        let kind = classify("[DUT#|12345:87654321]");
        assert_eq!(
            kind,
            ScanKind::Dut(DutId {
                sn: 87654321,
                mn: 12345
            })
        );
    }

    #[test]
    fn classifies_dut_with_option() {
        let kind = classify("[DUT|12345:87654321:ABCDEFGHIJKL]");
        assert_eq!(
            kind,
            ScanKind::DutWithOption {
                id: DutId {
                    sn: 87654321,
                    mn: 12345
                },
                option: "ABCDEFGHIJKL".to_string(),
            }
        );
    }

    #[test]
    fn classifies_psu_label() {
        let kind = classify("[PSU#|ABCD:123-4567]");
        assert_eq!(
            kind,
            ScanKind::Psu {
                word: "ABCD".to_string(),
                code: "123-4567".to_string(),
            }
        );
    }

    #[test]
    fn unrecognized_label_is_not_an_error() {
        let kind = classify("garbage");
        assert_eq!(kind, ScanKind::Unrecognized("garbage".to_string()));
    }
}
